mod buf_mgr;
mod error;
mod frame;
mod frame_table;

pub use buf_mgr::{BufMgr, BufMgrRef};
pub use error::{BufferError, BufferResult};
pub use frame::{Frame, FrameRef};
