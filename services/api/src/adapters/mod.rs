pub mod criteria_llm;
pub mod db;
pub mod relevancy_llm;

pub use criteria_llm::OpenAiCriteriaAdapter;
pub use db::DbAdapter;
pub use relevancy_llm::OpenAiRelevancyAdapter;
