pub mod capture;
pub mod metrics;
pub mod processor;
pub mod rest_store;
pub mod store;
pub mod stripe;

pub use capture::{CaptureOrchestrator, CaptureOutcome};
pub use metrics::{get_metrics, init_metrics};
pub use processor::{PaymentIntent, PaymentIntentStatus, PaymentProcessor, ProcessorError};
pub use rest_store::RestStore;
pub use store::{PaymentStore, StoreError};
pub use stripe::StripeClient;
