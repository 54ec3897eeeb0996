//! Characteristic dispatcher
//!
//! Executes batched reads and writes against the registry. Every item is
//! handled independently and reported with its own status; nothing raised by
//! an accessory hook escapes a batch.
//!
//! A write batch runs in three phases:
//!
//! 1. Under a registry read lock, resolve items, check availability and
//!    permissions, validate values and collect the hooks to call.
//! 2. Without any registry lock, call characteristic write hooks, then each
//!    service's change callback once with all of its changed values.
//! 3. Under a registry write lock, store the accepted values and queue
//!    change events.
//!
//! Hooks may therefore call back into the driver. Batches and server-side
//! value updates are serialized by a reentrant lock, so a hook running on
//! the batch's thread can still update values.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use hap_types::{
    Aid, EventNotification, HapStatus, Iid, Permission, Properties, ReadItem, ReadResponse, Value,
    WriteRequest, WriteResponse, WriteStatus, topic,
};
use parking_lot::{ReentrantMutex, RwLock};

use crate::error::RegistryError;
use crate::events::EventBus;
use crate::model::{Getter, Registry, ServiceSetter, Setter};
use crate::transport::ClientAddr;

/// Runs read and write batches against a registry
pub struct Dispatcher {
    registry: Arc<RwLock<Registry>>,
    events: EventBus,
    batch: ReentrantMutex<()>,
}

/// A validated write waiting for its hooks
struct PendingWrite {
    index: usize,
    aid: Aid,
    iid: Iid,
    name: String,
    value: Value,
    setter: Option<Setter>,
}

/// Writes of one service within a batch
struct ServiceWrites {
    aid: Aid,
    service_iid: Iid,
    callback: Option<ServiceSetter>,
    writes: Vec<PendingWrite>,
}

/// A read waiting for its getter
enum PendingRead {
    Done(ReadItem),
    Hook {
        aid: Aid,
        iid: Iid,
        getter: Getter,
        properties: Properties,
    },
}

impl Dispatcher {
    pub fn new(registry: Arc<RwLock<Registry>>, events: EventBus) -> Self {
        Self {
            registry,
            events,
            batch: ReentrantMutex::new(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a write batch on behalf of `origin`
    ///
    /// Returns one status per request item, in request order. Change events
    /// for accepted values are queued with `origin` so the writer is not
    /// notified of its own change.
    pub fn set_characteristics(
        &self,
        request: WriteRequest,
        origin: Option<ClientAddr>,
    ) -> WriteResponse {
        let _batch = self.batch.lock();

        let mut statuses: Vec<WriteStatus> = request
            .characteristics
            .iter()
            .map(|item| WriteStatus {
                aid: item.aid,
                iid: item.iid,
                status: HapStatus::Success,
            })
            .collect();

        // Phase 1: resolve and validate
        let mut groups: Vec<ServiceWrites> = Vec::new();
        {
            let registry = self.registry.read();

            for (index, item) in request.characteristics.into_iter().enumerate() {
                let (aid, iid) = (item.aid, item.iid);
                let fail = |statuses: &mut Vec<WriteStatus>, status: HapStatus| {
                    tracing::debug!(aid, iid, %status, "Write rejected");
                    statuses[index].status = status;
                };

                let Some(accessory) = registry.get(aid) else {
                    fail(&mut statuses, HapStatus::ServiceCommunicationFailure);
                    continue;
                };
                if !accessory.is_available() {
                    fail(&mut statuses, HapStatus::ServiceCommunicationFailure);
                    continue;
                }
                let Some((service, characteristic)) = accessory.locate(iid) else {
                    fail(&mut statuses, HapStatus::ServiceCommunicationFailure);
                    continue;
                };
                let properties = characteristic.properties();

                if let Some(enable) = item.events {
                    if !properties.has_permission(Permission::Notify) {
                        fail(&mut statuses, HapStatus::NotificationNotSupported);
                        continue;
                    }
                    if let Some(client) = origin {
                        let topic = topic(aid, iid);
                        if enable {
                            self.events.subscribe(&topic, client);
                        } else {
                            self.events.unsubscribe(&topic, client);
                        }
                    }
                }

                let Some(value) = item.value else { continue };

                if !properties.has_permission(Permission::PairedWrite) {
                    fail(&mut statuses, HapStatus::ReadOnlyCharacteristic);
                    continue;
                }
                let value = match properties.validate(value) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::debug!(aid, iid, error = %e, "Invalid value");
                        fail(&mut statuses, HapStatus::InvalidValueInRequest);
                        continue;
                    }
                };

                let write = PendingWrite {
                    index,
                    aid,
                    iid,
                    name: characteristic.name().to_string(),
                    value,
                    setter: characteristic.setter(),
                };
                match groups
                    .iter_mut()
                    .find(|g| g.aid == aid && g.service_iid == service.iid())
                {
                    Some(group) => group.writes.push(write),
                    None => groups.push(ServiceWrites {
                        aid,
                        service_iid: service.iid(),
                        callback: service.setter(),
                        writes: vec![write],
                    }),
                }
            }
        }

        // Phase 2: hooks, outside the registry lock
        let mut accepted: Vec<PendingWrite> = Vec::new();
        for group in groups {
            let mut changed = Vec::new();
            for write in group.writes {
                if let Some(setter) = &write.setter {
                    if let Err(e) = invoke(|| setter(&write.value)) {
                        tracing::warn!(aid = write.aid, iid = write.iid, error = %e, "Characteristic write hook failed");
                        statuses[write.index].status = HapStatus::ServiceCommunicationFailure;
                        continue;
                    }
                }
                changed.push(write);
            }

            if let Some(callback) = &group.callback {
                if !changed.is_empty() {
                    let values: HashMap<String, Value> = changed
                        .iter()
                        .map(|w| (w.name.clone(), w.value.clone()))
                        .collect();
                    if let Err(e) = invoke(|| callback(&values)) {
                        tracing::warn!(aid = group.aid, service = group.service_iid, error = %e, "Service callback failed");
                        for write in &changed {
                            statuses[write.index].status = HapStatus::ServiceCommunicationFailure;
                        }
                        continue;
                    }
                }
            }
            accepted.extend(changed);
        }

        // Phase 3: commit and queue change events
        if !accepted.is_empty() {
            let mut registry = self.registry.write();
            for write in accepted {
                let Some(characteristic) = registry.characteristic_mut(write.aid, write.iid) else {
                    statuses[write.index].status = HapStatus::ServiceCommunicationFailure;
                    continue;
                };
                characteristic.store(write.value.clone());
                tracing::trace!(aid = write.aid, iid = write.iid, value = %write.value, "Value written");
                self.queue_change(write.aid, write.iid, write.value, origin);
            }
        }

        WriteResponse {
            characteristics: statuses,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Read a batch of `"aid.iid"` keys
    ///
    /// Returns one item per key, in key order. A value read through a hook
    /// becomes the stored value once it passes validation.
    pub fn get_characteristics<K: AsRef<str>>(&self, keys: &[K]) -> ReadResponse {
        let _batch = self.batch.lock();

        let pending: Vec<PendingRead> = {
            let registry = self.registry.read();
            keys.iter()
                .map(|key| resolve_read(&registry, key.as_ref()))
                .collect()
        };

        let mut hooked: Vec<(Aid, Iid, Value)> = Vec::new();
        let characteristics = pending
            .into_iter()
            .map(|read| match read {
                PendingRead::Done(item) => item,
                PendingRead::Hook { aid, iid, getter, properties } => {
                    let value = match invoke(|| getter()) {
                        Ok(value) => value,
                        Err(e) => {
                            tracing::warn!(aid, iid, error = %e, "Characteristic read hook failed");
                            return ReadItem::failed(aid, iid, HapStatus::ServiceCommunicationFailure);
                        }
                    };
                    match properties.validate(value) {
                        Ok(value) => {
                            hooked.push((aid, iid, value.clone()));
                            ReadItem::ok(aid, iid, value)
                        }
                        Err(e) => {
                            tracing::warn!(aid, iid, error = %e, "Read hook returned an invalid value");
                            ReadItem::failed(aid, iid, HapStatus::ServiceCommunicationFailure)
                        }
                    }
                }
            })
            .collect();

        if !hooked.is_empty() {
            let mut registry = self.registry.write();
            for (aid, iid, value) in hooked {
                if let Some(c) = registry.characteristic_mut(aid, iid) {
                    c.store(value);
                }
            }
        }

        ReadResponse { characteristics }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Server-side updates
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a value set by accessory code and notify every subscriber
    ///
    /// Hooks are not called. Returns the stored value after validation.
    pub fn update_value(&self, aid: Aid, iid: Iid, value: Value) -> Result<Value, RegistryError> {
        let _batch = self.batch.lock();

        let value = {
            let mut registry = self.registry.write();
            let characteristic = registry
                .characteristic_mut(aid, iid)
                .ok_or(RegistryError::UnknownCharacteristic { aid, iid })?;
            characteristic
                .set_value(value)
                .map_err(|source| RegistryError::InvalidValue { aid, iid, source })?
        };

        self.queue_change(aid, iid, value.clone(), None);
        Ok(value)
    }

    fn queue_change(&self, aid: Aid, iid: Iid, value: Value, origin: Option<ClientAddr>) {
        match serde_json::to_vec(&EventNotification::single(aid, iid, value)) {
            Ok(payload) => {
                self.events.publish(&topic(aid, iid), payload, origin);
            }
            Err(e) => tracing::error!(aid, iid, error = %e, "Failed to encode event"),
        }
    }
}

fn resolve_read(registry: &Registry, key: &str) -> PendingRead {
    let failed = |aid, iid| PendingRead::Done(ReadItem::failed(aid, iid, HapStatus::ServiceCommunicationFailure));

    let Ok(id) = key.parse::<hap_types::CharacteristicId>() else {
        let (aid, iid) = partial_ids(key);
        tracing::debug!(key, "Malformed characteristic key");
        return failed(aid, iid);
    };
    let (aid, iid) = (id.aid, id.iid);

    let Some(accessory) = registry.get(aid).filter(|a| a.is_available()) else {
        return failed(aid, iid);
    };
    let Some(characteristic) = accessory.characteristic(iid) else {
        return failed(aid, iid);
    };
    if !characteristic.properties().has_permission(Permission::PairedRead) {
        return PendingRead::Done(ReadItem::failed(aid, iid, HapStatus::WriteOnlyCharacteristic));
    }

    match characteristic.getter() {
        Some(getter) => PendingRead::Hook {
            aid,
            iid,
            getter,
            properties: characteristic.properties().clone(),
        },
        None => PendingRead::Done(ReadItem::ok(aid, iid, characteristic.value().clone())),
    }
}

/// Best-effort ids of a malformed key, `0` where a part does not parse
fn partial_ids(key: &str) -> (Aid, Iid) {
    let mut parts = key.splitn(2, '.');
    let aid = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
    let iid = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
    (aid, iid)
}

/// Call an accessory hook, turning a panic into an error
fn invoke<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("hook panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::{RecordingTransport, client};
    use crate::model::{Accessory, Bridge, catalog};
    use hap_types::WriteItem;
    use parking_lot::Mutex;

    struct Fixture {
        dispatcher: Dispatcher,
        registry: Arc<RwLock<Registry>>,
        events: EventBus,
        transport: Arc<RecordingTransport>,
    }

    fn fixture(accessories: Vec<Accessory>) -> (Fixture, Vec<Aid>) {
        let transport = Arc::new(RecordingTransport::default());
        let events = EventBus::new(transport.clone());
        let mut registry = Registry::new();
        registry.add_bridge(Bridge::new("Bridge")).unwrap();
        let aids = accessories
            .into_iter()
            .map(|a| registry.add_accessory(a).unwrap())
            .collect();
        let registry = Arc::new(RwLock::new(registry));

        let fixture = Fixture {
            dispatcher: Dispatcher::new(registry.clone(), events.clone()),
            registry,
            events,
            transport,
        };
        (fixture, aids)
    }

    const ON: Iid = 9;
    const BRIGHTNESS: Iid = 10;

    #[test]
    fn test_write_then_read() {
        let (f, aids) = fixture(vec![Accessory::new("Lamp").with_service(catalog::lightbulb())]);
        let aid = aids[0];

        let res = f.dispatcher.set_characteristics(
            WriteRequest::new(vec![WriteItem::value(aid, ON, true), WriteItem::value(aid, BRIGHTNESS, 42)]),
            Some(client(1)),
        );
        assert!(res.is_success());

        let read = f.dispatcher.get_characteristics(&[format!("{aid}.{ON}"), format!("{aid}.{BRIGHTNESS}")]);
        assert_eq!(read.characteristics[0], ReadItem::ok(aid, ON, Value::Bool(true)));
        assert_eq!(read.characteristics[1], ReadItem::ok(aid, BRIGHTNESS, Value::Int(42)));
    }

    #[test]
    fn test_service_callback_receives_coalesced_values() {
        let calls: Arc<Mutex<Vec<HashMap<String, Value>>>> = Arc::default();
        let recorded = calls.clone();
        let lamp = Accessory::new("Lamp").with_service(catalog::lightbulb().on_change(move |values| {
            recorded.lock().push(values.clone());
            Ok(())
        }));
        let (f, aids) = fixture(vec![lamp]);
        let aid = aids[0];

        let res = f.dispatcher.set_characteristics(
            WriteRequest::new(vec![WriteItem::value(aid, ON, true), WriteItem::value(aid, BRIGHTNESS, 88)]),
            None,
        );
        assert!(res.is_success());

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        let expected: HashMap<String, Value> =
            [("On".to_string(), Value::Bool(true)), ("Brightness".to_string(), Value::Int(88))]
                .into_iter()
                .collect();
        assert_eq!(calls[0], expected);
    }

    #[test]
    fn test_unavailable_accessory_fails_without_callbacks() {
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        let lamp = Accessory::new("Lamp").with_service(catalog::lightbulb().on_change(move |_| {
            *flag.lock() = true;
            Ok(())
        }));
        let (f, aids) = fixture(vec![lamp, Accessory::new("Switch").with_service(catalog::switch())]);
        f.registry.write().set_available(aids[0], false).unwrap();

        let res = f.dispatcher.set_characteristics(
            WriteRequest::new(vec![WriteItem::value(aids[0], ON, true), WriteItem::value(aids[1], ON, true)]),
            None,
        );

        assert_eq!(res.status_of(aids[0], ON), Some(HapStatus::ServiceCommunicationFailure));
        assert_eq!(res.status_of(aids[1], ON), Some(HapStatus::Success));
        assert!(!*called.lock());

        let read = f.dispatcher.get_characteristics(&[format!("{}.{ON}", aids[0])]);
        assert_eq!(read.characteristics[0].status.code(), -70402);
        assert!(read.characteristics[0].value.is_none());
    }

    #[test]
    fn test_failing_getter_is_isolated() {
        let lamp = Accessory::new("Lamp").with_service(
            catalog::lightbulb().with_characteristic(
                catalog::outlet_in_use().on_read(|| anyhow::bail!("sensor unplugged")),
            ),
        );
        let (f, aids) = fixture(vec![lamp]);
        let aid = aids[0];
        let broken = 11;

        let read = f.dispatcher.get_characteristics(&[
            format!("{aid}.{ON}"),
            format!("{aid}.{broken}"),
            format!("{aid}.{BRIGHTNESS}"),
        ]);

        let items = &read.characteristics;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], ReadItem::ok(aid, ON, Value::Bool(false)));
        assert_eq!(items[1], ReadItem::failed(aid, broken, HapStatus::ServiceCommunicationFailure));
        assert_eq!(items[2], ReadItem::ok(aid, BRIGHTNESS, Value::Int(0)));
    }

    #[test]
    fn test_getter_value_is_cached() {
        let lamp = Accessory::new("Lamp")
            .with_service(catalog::switch().with_characteristic(catalog::outlet_in_use().on_read(|| Ok(Value::Bool(true)))));
        let (f, aids) = fixture(vec![lamp]);
        let aid = aids[0];

        let read = f.dispatcher.get_characteristics(&[format!("{aid}.10")]);
        assert_eq!(read.characteristics[0].value, Some(Value::Bool(true)));
        assert_eq!(
            f.registry.read().characteristic(aid, 10).unwrap().value(),
            &Value::Bool(true)
        );
    }

    #[test]
    fn test_invalid_getter_value_is_not_cached() {
        let lamp = Accessory::new("Lamp").with_service(
            catalog::switch()
                .with_characteristic(catalog::outlet_in_use().on_read(|| Ok(Value::String("yes".into())))),
        );
        let (f, aids) = fixture(vec![lamp]);
        let aid = aids[0];

        let read = f.dispatcher.get_characteristics(&[format!("{aid}.10"), format!("{aid}.{ON}")]);
        assert_eq!(read.characteristics[0], ReadItem::failed(aid, 10, HapStatus::ServiceCommunicationFailure));
        assert_eq!(read.characteristics[1], ReadItem::ok(aid, ON, Value::Bool(false)));
        assert_eq!(
            f.registry.read().characteristic(aid, 10).unwrap().value(),
            &Value::Bool(false)
        );
    }

    #[test]
    fn test_malformed_and_unknown_keys() {
        let (f, aids) = fixture(vec![Accessory::new("Lamp").with_service(catalog::lightbulb())]);
        let aid = aids[0];

        let unknown_iid = format!("{aid}.999");
        let read = f.dispatcher.get_characteristics(&["garbage", "7.x", "99.9", unknown_iid.as_str()]);
        let items = &read.characteristics;
        assert_eq!(items[0], ReadItem::failed(0, 0, HapStatus::ServiceCommunicationFailure));
        assert_eq!(items[1], ReadItem::failed(7, 0, HapStatus::ServiceCommunicationFailure));
        assert_eq!(items[2], ReadItem::failed(99, 9, HapStatus::ServiceCommunicationFailure));
        assert_eq!(items[3], ReadItem::failed(aid, 999, HapStatus::ServiceCommunicationFailure));
    }

    #[test]
    fn test_failing_service_callback_rejects_its_items_only() {
        let lamp = Accessory::new("Lamp")
            .with_service(catalog::lightbulb().on_change(|_| anyhow::bail!("bus offline")));
        let (f, aids) = fixture(vec![lamp, Accessory::new("Switch").with_service(catalog::switch())]);

        let res = f.dispatcher.set_characteristics(
            WriteRequest::new(vec![
                WriteItem::value(aids[0], ON, true),
                WriteItem::value(aids[1], ON, true),
                WriteItem::value(aids[0], BRIGHTNESS, 50),
            ]),
            None,
        );

        let codes: Vec<i32> = res.characteristics.iter().map(|s| s.status.code()).collect();
        assert_eq!(codes, vec![-70402, 0, -70402]);

        let registry = f.registry.read();
        assert_eq!(registry.characteristic(aids[0], ON).unwrap().value(), &Value::Bool(false));
        assert_eq!(registry.characteristic(aids[1], ON).unwrap().value(), &Value::Bool(true));
    }

    #[test]
    fn test_panicking_hook_is_isolated() {
        let lamp = Accessory::new("Lamp").with_service(
            catalog::switch().with_characteristic(catalog::brightness().on_write(|_| panic!("boom"))),
        );
        let (f, aids) = fixture(vec![lamp]);
        let aid = aids[0];

        let res = f.dispatcher.set_characteristics(
            WriteRequest::new(vec![WriteItem::value(aid, 10, 30), WriteItem::value(aid, ON, true)]),
            None,
        );
        assert_eq!(res.status_of(aid, 10), Some(HapStatus::ServiceCommunicationFailure));
        assert_eq!(res.status_of(aid, ON), Some(HapStatus::Success));
    }

    #[test]
    fn test_invalid_and_read_only_writes() {
        let (f, aids) = fixture(vec![Accessory::new("Sensor").with_service(catalog::temperature_sensor())]);
        let aid = aids[0];
        let temperature = 9;

        let res = f.dispatcher.set_characteristics(
            WriteRequest::new(vec![
                WriteItem::value(aid, temperature, 20.0),
                WriteItem::value(aid, 2, "not a bool"),
                WriteItem::value(aid, 3, "Acme"),
            ]),
            None,
        );
        let codes: Vec<i32> = res.characteristics.iter().map(|s| s.status.code()).collect();
        assert_eq!(codes, vec![-70404, -70410, -70404]);
    }

    #[test]
    fn test_numeric_writes_are_clamped() {
        let (f, aids) = fixture(vec![Accessory::new("Lamp").with_service(catalog::lightbulb())]);
        let aid = aids[0];

        let res = f.dispatcher.set_characteristics(
            WriteRequest::new(vec![WriteItem::value(aid, BRIGHTNESS, 150)]),
            None,
        );
        assert!(res.is_success());
        assert_eq!(
            f.registry.read().characteristic(aid, BRIGHTNESS).unwrap().value(),
            &Value::Int(100)
        );
    }

    #[test]
    fn test_write_events_skip_the_writer() {
        let (f, aids) = fixture(vec![Accessory::new("Lamp").with_service(catalog::lightbulb())]);
        let aid = aids[0];

        // Subscribe two clients through ev writes
        for n in [1, 2] {
            let res = f.dispatcher.set_characteristics(
                WriteRequest::new(vec![WriteItem::events(aid, ON, true)]),
                Some(client(n)),
            );
            assert!(res.is_success());
        }
        assert_eq!(f.events.subscribers(&topic(aid, ON)), vec![client(1), client(2)]);

        f.dispatcher.set_characteristics(
            WriteRequest::new(vec![WriteItem::value(aid, ON, true)]),
            Some(client(1)),
        );
        f.events.send_events();

        let pushed = f.transport.pushed.lock().clone();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].1, client(2));
        let body: serde_json::Value = serde_json::from_slice(&pushed[0].0).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"characteristics": [{"aid": aid, "iid": ON, "value": true}]})
        );
    }

    #[test]
    fn test_failed_write_queues_no_event() {
        let lamp = Accessory::new("Lamp")
            .with_service(catalog::lightbulb().on_change(|_| anyhow::bail!("nope")));
        let (f, aids) = fixture(vec![lamp]);
        let aid = aids[0];
        f.events.subscribe(&topic(aid, ON), client(2));

        f.dispatcher.set_characteristics(
            WriteRequest::new(vec![WriteItem::value(aid, ON, true)]),
            Some(client(1)),
        );
        assert_eq!(f.events.pending(), 0);
    }

    #[test]
    fn test_ev_on_non_notifying_characteristic() {
        let (f, aids) = fixture(vec![Accessory::new("Lamp")]);
        let aid = aids[0];

        let res = f.dispatcher.set_characteristics(
            WriteRequest::new(vec![WriteItem::events(aid, 3, true)]),
            Some(client(1)),
        );
        assert_eq!(res.status_of(aid, 3), Some(HapStatus::NotificationNotSupported));
    }

    #[test]
    fn test_update_value_publishes_to_everyone() {
        let (f, aids) = fixture(vec![Accessory::new("Sensor").with_service(catalog::temperature_sensor())]);
        let aid = aids[0];
        f.events.subscribe(&topic(aid, 9), client(1));

        let stored = f.dispatcher.update_value(aid, 9, Value::Float(21.5)).unwrap();
        assert_eq!(stored, Value::Float(21.5));
        f.events.send_events();
        assert_eq!(f.transport.clients(), vec![client(1)]);

        assert!(matches!(
            f.dispatcher.update_value(aid, 99, Value::Float(1.0)),
            Err(RegistryError::UnknownCharacteristic { .. })
        ));
        assert!(matches!(
            f.dispatcher.update_value(aid, 9, Value::from("hot")),
            Err(RegistryError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_hook_can_update_values_reentrantly() {
        let dispatcher_slot: Arc<Mutex<Option<Arc<Dispatcher>>>> = Arc::default();
        let slot = dispatcher_slot.clone();
        let lamp = Accessory::new("Lamp").with_service(catalog::outlet().on_change(move |values| {
            if let Some(dispatcher) = slot.lock().as_ref() {
                let on = values.get("On").and_then(Value::as_bool).unwrap_or(false);
                dispatcher.update_value(2, 10, Value::Bool(on))?;
            }
            Ok(())
        }));
        let (f, aids) = fixture(vec![lamp]);
        let dispatcher = Arc::new(f.dispatcher);
        *dispatcher_slot.lock() = Some(dispatcher.clone());

        let res = dispatcher.set_characteristics(
            WriteRequest::new(vec![WriteItem::value(aids[0], ON, true)]),
            None,
        );
        assert!(res.is_success());
        assert_eq!(
            f.registry.read().characteristic(aids[0], 10).unwrap().value(),
            &Value::Bool(true)
        );
        dispatcher_slot.lock().take();
    }
}
