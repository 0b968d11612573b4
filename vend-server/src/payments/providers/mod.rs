//! Payment gateway clients.
//!
//! One client per gateway behind [`ProviderClient`], so the funding
//! service stays ignorant of HTTP details and tests can swap in a
//! scripted client. Webhook parsing lives next to each client; the
//! HTTP layer hands the raw body to the matching adapter and feeds the
//! resulting event to the reconciliation engine.

use async_trait::async_trait;

pub mod oxapay;
pub mod razorpay;

pub use oxapay::OxapayClient;
pub use razorpay::RazorpayClient;

/// What the funding service asks a gateway for.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub user_id: i64,
    /// Amount in the gateway's native currency (INR for Razorpay,
    /// USD for OxaPay).
    pub amount: f64,
    pub description: String,
}

/// What comes back: the gateway's reference id (webhook correlation
/// key) and where to send the user.
#[derive(Debug, Clone)]
pub struct ChargeResponse {
    pub provider_ref: String,
    pub pay_url: Option<String>,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn create_charge(&self, req: &ChargeRequest) -> anyhow::Result<ChargeResponse>;
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Scripted client: hands out sequential refs, or fails on demand.
    #[derive(Debug, Default)]
    pub struct FakeProvider {
        pub prefix: &'static str,
        pub fail: bool,
        counter: AtomicI64,
        pub requests: Mutex<Vec<ChargeRequest>>,
    }

    impl FakeProvider {
        pub fn new(prefix: &'static str) -> Self {
            Self {
                prefix,
                ..Default::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                prefix: "fail",
                fail: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ProviderClient for FakeProvider {
        async fn create_charge(&self, req: &ChargeRequest) -> anyhow::Result<ChargeResponse> {
            self.requests.lock().unwrap().push(req.clone());
            if self.fail {
                anyhow::bail!("gateway unavailable");
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(ChargeResponse {
                provider_ref: format!("{}_{n}", self.prefix),
                pay_url: Some(format!("https://pay.test/{}/{n}", self.prefix)),
            })
        }
    }
}
