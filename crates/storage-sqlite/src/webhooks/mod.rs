mod model;
mod repository;

pub use model::WebhookEventDB;
pub use repository::WebhookEventRepository;
