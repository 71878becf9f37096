use crate::types::FlowEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: FlowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunId;

    #[tokio::test]
    async fn subscribers_receive_in_publish_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let run_id = RunId::from_str("r");
        for msg in ["a", "b"] {
            bus.publish(FlowEvent::Warning {
                run_id: run_id.clone(),
                message: msg.into(),
                at: chrono::Utc::now(),
            });
        }
        for expected in ["a", "b"] {
            match rx.recv().await.unwrap() {
                FlowEvent::Warning { message, .. } => assert_eq!(message, expected),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(FlowEvent::Warning {
            run_id: RunId::new(),
            message: "nobody listens".into(),
            at: chrono::Utc::now(),
        });
    }
}
