//! An in-memory [`SmscDriver`] test double used by the router selection
//! and S1-S3 integration scenarios in place of a real SMSC dialect.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::driver::{DriverEvent, SmscDriver};
use crate::error::SmscError;
use crate::message::Sms;

/// A driver that accepts or rejects every send deterministically and
/// records what it was asked to send, for assertions in tests.
pub struct MockDriver {
    name: String,
    accept: bool,
    sent: Mutex<Vec<Sms>>,
}

impl MockDriver {
    pub fn new(name: impl Into<String>, accept: bool) -> Self {
        MockDriver {
            name: name.into(),
            accept,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub async fn sent_messages(&self) -> Vec<Sms> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl SmscDriver for MockDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, events: mpsc::Sender<DriverEvent>) -> Result<(), SmscError> {
        let _ = events.send(DriverEvent::Connected).await;
        Ok(())
    }

    async fn send_msg(&self, sms: &Sms) -> Result<(), SmscError> {
        if !self.accept {
            return Err(SmscError::SendFailed(format!(
                "mock driver '{}' configured to reject",
                self.name
            )));
        }
        self.sent.lock().await.push(sms.clone());
        Ok(())
    }

    async fn queued(&self) -> i64 {
        0
    }

    async fn shutdown(&self) -> Result<(), SmscError> {
        Ok(())
    }
}
