pub mod black_set;
pub mod ddos;
pub mod url_tracker;

pub use black_set::BlackSet;
pub use ddos::DdosGuard;
pub use url_tracker::UrlTracker;
