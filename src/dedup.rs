//! In-flight request deduplication.
//!
//! Keyed table of pending GET/HEAD calls. The first caller for a key becomes
//! the owner and runs the request; joiners await the same broadcast result.
//! Entries are reference counted: every caller releases its interest exactly
//! once (via a drop guard in the client), and whichever release reaches zero
//! removes the entry.

use std::collections::HashMap;
use std::sync::Mutex;

use http::Method;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::ApiError;
use crate::response::ResponseBody;

pub(crate) type FlightResult = Result<ResponseBody, ApiError>;
type Slot = Option<FlightResult>;

struct Flight {
    rx: watch::Receiver<Slot>,
    ref_count: usize,
}

/// What `checkout` handed the caller.
pub(crate) enum Checkout {
    /// No flight existed; the caller must run the request and publish the
    /// result through `tx`.
    Owner {
        tx: watch::Sender<Slot>,
        rx: watch::Receiver<Slot>,
    },
    /// A flight is already pending; await `rx`.
    Joiner { rx: watch::Receiver<Slot> },
}

pub(crate) struct FlightTable {
    flights: Mutex<HashMap<String, Flight>>,
}

impl FlightTable {
    pub(crate) fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Joins the pending flight for `key`, or registers a new one with a
    /// reference count of 1.
    pub(crate) fn checkout(&self, key: &str) -> Checkout {
        let mut flights = self.flights.lock().unwrap();
        if let Some(flight) = flights.get_mut(key) {
            flight.ref_count += 1;
            return Checkout::Joiner {
                rx: flight.rx.clone(),
            };
        }

        let (tx, rx) = watch::channel(None);
        flights.insert(
            key.to_string(),
            Flight {
                rx: rx.clone(),
                ref_count: 1,
            },
        );
        Checkout::Owner { tx, rx }
    }

    /// Drops one caller's interest; the entry is removed when the count
    /// reaches zero.
    pub(crate) fn release(&self, key: &str) {
        let mut flights = self.flights.lock().unwrap();
        if let Some(flight) = flights.get_mut(key) {
            flight.ref_count -= 1;
            if flight.ref_count == 0 {
                flights.remove(key);
            }
        }
    }

    /// Number of pending flights.
    pub(crate) fn len(&self) -> usize {
        self.flights.lock().unwrap().len()
    }
}

/// The default cache key: `method:endpoint:body-json`.
pub(crate) fn default_key(method: &Method, endpoint: &str, body: Option<&Value>) -> String {
    let body = body.unwrap_or(&Value::Null);
    format!("{}:{}:{}", method, endpoint, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_checkout_joins_the_pending_flight() {
        let table = FlightTable::new();
        assert!(matches!(table.checkout("k"), Checkout::Owner { .. }));
        assert!(matches!(table.checkout("k"), Checkout::Joiner { .. }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn entry_is_removed_by_the_last_release() {
        let table = FlightTable::new();
        let _owner = table.checkout("k");
        let _joiner = table.checkout("k");

        table.release("k");
        assert_eq!(table.len(), 1);
        table.release("k");
        assert_eq!(table.len(), 0);

        // A new checkout after removal starts a fresh flight.
        assert!(matches!(table.checkout("k"), Checkout::Owner { .. }));
    }

    #[test]
    fn distinct_keys_track_separate_flights() {
        let table = FlightTable::new();
        let _a = table.checkout("a");
        let _b = table.checkout("b");
        assert_eq!(table.len(), 2);
        table.release("a");
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn joiner_observes_the_owner_broadcast() {
        let table = FlightTable::new();
        let Checkout::Owner { tx, .. } = table.checkout("k") else {
            panic!("expected owner");
        };
        let Checkout::Joiner { mut rx } = table.checkout("k") else {
            panic!("expected joiner");
        };

        tx.send(Some(Ok(ResponseBody::Text("shared".to_string()))))
            .unwrap();
        let seen = rx.wait_for(|slot| slot.is_some()).await.unwrap();
        assert_eq!(
            seen.clone().unwrap().unwrap(),
            ResponseBody::Text("shared".to_string())
        );
    }

    #[test]
    fn default_key_includes_method_endpoint_and_body() {
        let body = serde_json::json!({"a": 1});
        assert_eq!(
            default_key(&Method::GET, "/sources", Some(&body)),
            r#"GET:/sources:{"a":1}"#
        );
        assert_eq!(default_key(&Method::GET, "/sources", None), "GET:/sources:null");
    }
}
