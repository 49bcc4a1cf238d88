use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use labterm_common::mutex_lock_or_recover;
use labterm_proto::ApiError;
use labterm_proto::Provisioner;

/// A provisioner double with a configurable response and optional delay.
pub struct MockProvisioner {
    response: Mutex<Result<u64, String>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl MockProvisioner {
    /// `Err(message)` is returned as a 500-status API error.
    pub fn new(response: Result<u64, String>) -> Self {
        Self {
            response: Mutex::new(response),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_response(&self, response: Result<u64, String>) {
        *mutex_lock_or_recover(&self.response) = response;
    }

    /// Make each call take this long, to exercise in-flight guarding.
    pub fn set_delay(&self, delay: Duration) {
        *mutex_lock_or_recover(&self.delay) = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn extend(&self, _session_id: &str) -> Result<u64, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *mutex_lock_or_recover(&self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match mutex_lock_or_recover(&self.response).clone() {
            Ok(end_time) => Ok(end_time),
            Err(message) => Err(ApiError::Status {
                status: 500,
                message,
            }),
        }
    }
}
