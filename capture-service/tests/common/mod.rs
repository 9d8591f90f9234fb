#![allow(dead_code)]

use async_trait::async_trait;
use capture_service::config::{
    CaptureConfig, Config, ObservabilityConfig, ServerConfig, StoreConfig, StripeConfig,
};
use capture_service::models::{
    BookingRecord, BookingStartedUpdate, BookingStatus, EscrowStatus, PaymentHeldUpdate,
    PaymentRecord, PaymentStatus,
};
use capture_service::services::{
    PaymentIntent, PaymentIntentStatus, PaymentProcessor, PaymentStore, ProcessorError,
    StoreError,
};
use capture_service::startup::Application;
use secrecy::Secret;
use service_core::retry::RetryConfig;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const INTENT_ID: &str = "pi_123";
pub const BOOKING_ID: &str = "bk_456";

/// External call observed by the fakes, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Capture(String),
    Retrieve(String),
    UpdatePayment(String),
    UpdateBooking(String),
    FindPayment(String),
}

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    /// Calls that change state somewhere (reads filtered out).
    pub fn effects(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::FindPayment(_) | Call::Retrieve(_)))
            .collect()
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Processor that captures each intent once and rejects any repeat, the way
/// Stripe treats an already-captured intent.
pub struct FakeProcessor {
    log: CallLog,
    captured: Mutex<HashSet<String>>,
    decline: Option<String>,
    unreachable: bool,
}

impl FakeProcessor {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            captured: Mutex::new(HashSet::new()),
            decline: None,
            unreachable: false,
        }
    }

    pub fn declining(log: CallLog, message: &str) -> Self {
        Self {
            decline: Some(message.to_string()),
            ..Self::new(log)
        }
    }

    pub fn unreachable(log: CallLog) -> Self {
        Self {
            unreachable: true,
            ..Self::new(log)
        }
    }

    /// Mark an intent as captured out of band.
    pub fn with_captured(self, payment_intent_id: &str) -> Self {
        self.captured
            .lock()
            .unwrap()
            .insert(payment_intent_id.to_string());
        self
    }

    fn intent(id: &str, status: PaymentIntentStatus) -> PaymentIntent {
        PaymentIntent {
            id: id.to_string(),
            status,
            amount: Some(5000),
            amount_received: Some(5000),
            currency: Some("cad".to_string()),
        }
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn capture(&self, payment_intent_id: &str) -> Result<PaymentIntent, ProcessorError> {
        self.log.push(Call::Capture(payment_intent_id.to_string()));

        if self.unreachable {
            return Err(ProcessorError::Transport("connection refused".to_string()));
        }
        if let Some(message) = &self.decline {
            return Err(ProcessorError::Rejected {
                status: 402,
                code: Some("card_declined".to_string()),
                message: message.clone(),
            });
        }

        let mut captured = self.captured.lock().unwrap();
        if !captured.insert(payment_intent_id.to_string()) {
            return Err(ProcessorError::Rejected {
                status: 400,
                code: Some("payment_intent_unexpected_state".to_string()),
                message: "This PaymentIntent has already been captured".to_string(),
            });
        }

        Ok(Self::intent(payment_intent_id, PaymentIntentStatus::Succeeded))
    }

    async fn retrieve(&self, payment_intent_id: &str) -> Result<PaymentIntent, ProcessorError> {
        self.log.push(Call::Retrieve(payment_intent_id.to_string()));

        if self.unreachable {
            return Err(ProcessorError::Transport("connection refused".to_string()));
        }

        let status = if self.captured.lock().unwrap().contains(payment_intent_id) {
            PaymentIntentStatus::Succeeded
        } else {
            PaymentIntentStatus::RequiresCapture
        };
        Ok(Self::intent(payment_intent_id, status))
    }
}

/// Injected write failure.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Fail with a retryable 503 this many times, then succeed.
    Transient(u32),
    /// Fail with a non-retryable rejection on every attempt.
    Permanent,
}

impl Fault {
    /// Consume one attempt; returns the error to report, if any.
    fn trip(slot: &Mutex<Option<Fault>>) -> Option<StoreError> {
        let mut slot = slot.lock().unwrap();
        let current = *slot;
        match current {
            Some(Fault::Transient(0)) | None => None,
            Some(Fault::Transient(n)) => {
                *slot = Some(Fault::Transient(n - 1));
                Some(StoreError::Rejected {
                    status: 503,
                    message: "service unavailable".to_string(),
                })
            }
            Some(Fault::Permanent) => Some(StoreError::Rejected {
                status: 400,
                message: "permission denied for table".to_string(),
            }),
        }
    }
}

/// In-memory `payments` / `bookings` tables.
pub struct FakeStore {
    log: CallLog,
    payments: Mutex<HashMap<String, PaymentRecord>>,
    bookings: Mutex<HashMap<String, BookingRecord>>,
    payment_fault: Mutex<Option<Fault>>,
    booking_fault: Mutex<Option<Fault>>,
    fail_reads: bool,
    write_delay: Option<Duration>,
}

impl FakeStore {
    pub fn empty(log: CallLog) -> Self {
        Self {
            log,
            payments: Mutex::new(HashMap::new()),
            bookings: Mutex::new(HashMap::new()),
            payment_fault: Mutex::new(None),
            booking_fault: Mutex::new(None),
            fail_reads: false,
            write_delay: None,
        }
    }

    /// Store holding an authorized payment and its booking.
    pub fn seeded(log: CallLog, payment_intent_id: &str, booking_id: &str) -> Self {
        let store = Self::empty(log);
        store.payments.lock().unwrap().insert(
            payment_intent_id.to_string(),
            PaymentRecord {
                payment_intent_id: payment_intent_id.to_string(),
                status: PaymentStatus::Pending,
                escrow_status: EscrowStatus::None,
                paid_at: None,
            },
        );
        store.bookings.lock().unwrap().insert(
            booking_id.to_string(),
            BookingRecord {
                id: booking_id.to_string(),
                status: BookingStatus::PaymentAuthorized,
                payment_agreed: false,
            },
        );
        store
    }

    pub fn fail_payment_writes(self, fault: Fault) -> Self {
        *self.payment_fault.lock().unwrap() = Some(fault);
        self
    }

    pub fn fail_booking_writes(self, fault: Fault) -> Self {
        *self.booking_fault.lock().unwrap() = Some(fault);
        self
    }

    /// Every `find_payment` fails with a transport error.
    pub fn fail_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Hold every write for `delay` before applying it.
    pub fn slow_writes(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    async fn pause(&self) {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn payment(&self, payment_intent_id: &str) -> Option<PaymentRecord> {
        self.payments.lock().unwrap().get(payment_intent_id).cloned()
    }

    pub fn booking(&self, booking_id: &str) -> Option<BookingRecord> {
        self.bookings.lock().unwrap().get(booking_id).cloned()
    }

    /// Remove an injected fault so later writes go through.
    pub fn heal(&self) {
        *self.payment_fault.lock().unwrap() = None;
        *self.booking_fault.lock().unwrap() = None;
    }
}

#[async_trait]
impl PaymentStore for FakeStore {
    async fn update_payment(
        &self,
        payment_intent_id: &str,
        update: &PaymentHeldUpdate,
    ) -> Result<(), StoreError> {
        self.log
            .push(Call::UpdatePayment(payment_intent_id.to_string()));
        self.pause().await;

        if let Some(err) = Fault::trip(&self.payment_fault) {
            return Err(err);
        }

        let mut payments = self.payments.lock().unwrap();
        let row = payments
            .get_mut(payment_intent_id)
            .ok_or_else(|| StoreError::NotFound {
                table: "payments".to_string(),
                key: format!("payment_intent_id={}", payment_intent_id),
            })?;
        row.status = update.status;
        row.escrow_status = update.escrow_status;
        row.paid_at = Some(update.paid_at);
        Ok(())
    }

    async fn update_booking(
        &self,
        booking_id: &str,
        update: &BookingStartedUpdate,
    ) -> Result<(), StoreError> {
        self.log.push(Call::UpdateBooking(booking_id.to_string()));
        self.pause().await;

        if let Some(err) = Fault::trip(&self.booking_fault) {
            return Err(err);
        }

        let mut bookings = self.bookings.lock().unwrap();
        let row = bookings
            .get_mut(booking_id)
            .ok_or_else(|| StoreError::NotFound {
                table: "bookings".to_string(),
                key: format!("id={}", booking_id),
            })?;
        row.status = update.status;
        row.payment_agreed = update.payment_agreed;
        Ok(())
    }

    async fn find_payment(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        self.log.push(Call::FindPayment(payment_intent_id.to_string()));
        if self.fail_reads {
            return Err(StoreError::Transport("connection reset by peer".to_string()));
        }
        Ok(self.payment(payment_intent_id))
    }
}

/// Retry policy with millisecond backoff so fault tests stay fast.
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        add_jitter: false,
    }
}

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Random port
        },
        store: StoreConfig {
            url: "http://127.0.0.1:9".to_string(),
            service_key: Secret::new("test-service-key".to_string()),
            payments_table: "payments".to_string(),
            bookings_table: "bookings".to_string(),
            timeout_secs: 5,
        },
        stripe: StripeConfig {
            secret_key: Secret::new("sk_test_123".to_string()),
            api_base_url: "http://127.0.0.1:9/v1".to_string(),
            timeout_secs: 5,
        },
        capture: CaptureConfig {
            guard_completed: false,
            store_write_retries: 1,
        },
        observability: ObservabilityConfig {
            log_level: "debug".to_string(),
            otlp_endpoint: None,
        },
        service_name: "capture-service-test".to_string(),
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub log: CallLog,
    pub processor: Arc<FakeProcessor>,
    pub store: Arc<FakeStore>,
}

impl TestApp {
    /// Spawn the service against a fresh processor and a store seeded with
    /// `INTENT_ID` / `BOOKING_ID`.
    pub async fn spawn() -> Self {
        let log = CallLog::default();
        let processor = FakeProcessor::new(log.clone());
        let store = FakeStore::seeded(log.clone(), INTENT_ID, BOOKING_ID);
        Self::spawn_with(log, processor, store).await
    }

    pub async fn spawn_with(log: CallLog, processor: FakeProcessor, store: FakeStore) -> Self {
        let processor = Arc::new(processor);
        let store = Arc::new(store);

        let app = Application::build_with(test_config(), processor.clone(), store.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            log,
            processor,
            store,
        }
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}{}", self.address, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }
}
