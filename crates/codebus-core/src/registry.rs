//! Subscriber registry.
//!
//! Two views over the same registrations, kept consistent under one lock:
//! code → handler slots, and subscriber → codes it occupies.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::args::Value;
use crate::handler::HandlerTemplate;

/// Identity of a registered subscriber: the address of its `Arc` allocation.
///
/// The registry keeps the `Arc` alive while registered, so the address
/// cannot be reused by another subscriber in the meantime.
pub(crate) type SubscriberId = usize;

pub(crate) fn subscriber_id<S>(subscriber: &Arc<S>) -> SubscriberId {
    Arc::as_ptr(subscriber) as usize
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    owner: TypeId,
    signature: Arc<str>,
}

struct Slot {
    template: HandlerTemplate,
    holders: HashMap<SubscriberId, Value>,
}

/// One scheduled invocation: a handler plus the instance it runs on.
#[derive(Clone)]
pub(crate) struct Delivery {
    pub(crate) template: HandlerTemplate,
    pub(crate) target: Option<Value>,
}

#[derive(Default)]
pub(crate) struct Registry {
    by_code: HashMap<i32, HashMap<EntryKey, Slot>>,
    by_subscriber: HashMap<SubscriberId, HashSet<i32>>,
}

impl Registry {
    pub(crate) fn is_registered(&self, id: SubscriberId) -> bool {
        self.by_subscriber.contains_key(&id)
    }

    /// Binds `templates` to the subscriber. Returns false if it was already
    /// registered or declares nothing.
    pub(crate) fn insert(
        &mut self,
        id: SubscriberId,
        target: Value,
        templates: &[HandlerTemplate],
    ) -> bool {
        if templates.is_empty() || self.is_registered(id) {
            return false;
        }

        let mut codes = HashSet::new();
        for template in templates {
            let key = EntryKey {
                owner: template.owner(),
                signature: Arc::from(template.signature()),
            };
            self.by_code
                .entry(template.code())
                .or_default()
                .entry(key)
                .or_insert_with(|| Slot {
                    template: template.clone(),
                    holders: HashMap::new(),
                })
                .holders
                .insert(id, Arc::clone(&target));
            codes.insert(template.code());
        }
        self.by_subscriber.insert(id, codes);
        true
    }

    /// Removes every binding of the subscriber. Returns false if it was not
    /// registered.
    pub(crate) fn remove(&mut self, id: SubscriberId) -> bool {
        let Some(codes) = self.by_subscriber.remove(&id) else {
            return false;
        };

        for code in codes {
            let Some(slots) = self.by_code.get_mut(&code) else {
                continue;
            };
            slots.retain(|_, slot| {
                slot.holders.remove(&id);
                !slot.holders.is_empty()
            });
            if slots.is_empty() {
                self.by_code.remove(&code);
            }
        }
        true
    }

    /// Every invocation a post to `code` would schedule right now.
    ///
    /// Instance handlers yield one delivery per holder; static handlers yield
    /// one delivery however many instances hold them.
    pub(crate) fn snapshot(&self, code: i32) -> Vec<Delivery> {
        let Some(slots) = self.by_code.get(&code) else {
            return Vec::new();
        };

        let mut deliveries = Vec::new();
        for slot in slots.values() {
            if slot.template.is_static() {
                deliveries.push(Delivery {
                    template: slot.template.clone(),
                    target: None,
                });
            } else {
                deliveries.extend(slot.holders.values().map(|target| Delivery {
                    template: slot.template.clone(),
                    target: Some(Arc::clone(target)),
                }));
            }
        }
        deliveries
    }

    pub(crate) fn delivery_count(&self, code: i32) -> usize {
        self.by_code.get(&code).map_or(0, |slots| {
            slots
                .values()
                .map(|slot| if slot.template.is_static() { 1 } else { slot.holders.len() })
                .sum()
        })
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.by_subscriber.len()
    }

    pub(crate) fn clear(&mut self) {
        self.by_code.clear();
        self.by_subscriber.clear();
    }
}
