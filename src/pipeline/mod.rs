//! Pipeline components: discovery, bounded dispatch, cancellation, orchestration.

pub mod batch;
pub mod cancel;
pub mod discover;
pub mod dispatch;
pub(crate) mod pool;

pub use batch::run_items;
pub use cancel::{
    CANCEL_EXIT_CODE, CancelMonitor, CancellationFlag, ChildGuard, ChildRegistry, MonitorState,
};
pub use discover::{DiscoverOpts, dedup_in_order, discover, read_list_file};
pub use dispatch::{DispatchStats, Dispatcher};
