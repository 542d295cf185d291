pub mod exchanges;
pub mod feeds;

// Re-export commonly used items
pub use exchanges::{build_feed, build_feeds};
pub use feeds::{
    FeedBoard, FeedName, FeedSettings, FeedSpec, FeedState, FeedStatus, FeedSupervisor, FeedsConfig,
    HttpFetcher, ReqwestFetcher,
};
