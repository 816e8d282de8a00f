pub mod block_repo;
pub mod hint_repo;
pub mod subscription_repo;
pub mod user_repo;

pub use block_repo::BlockRepo;
pub use hint_repo::NotificationHintRepo;
pub use subscription_repo::SubscriptionRepo;
pub use user_repo::UserRepo;
