//! Presence model for one bridged, non-Matter device.
//!
//! A [`SubDevice`] only tracks name, location, on/off state and
//! reachability. It knows nothing about clusters or endpoints beyond the id
//! it was bound to. Every externally observable change is pushed to a single
//! optional [`DeviceChangeObserver`], which is how the bridge learns about it.
//!
//! All setters take `&self` so drivers can share the device across threads.

use crate::matter::types::{EndptId, INVALID_ENDPOINT};
use bitflags::bitflags;
use log::{info, warn};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Weak};

/// Maximum name length in bytes.
pub const NAME_CAPACITY: usize = 32;
/// Maximum location length in bytes.
pub const LOCATION_CAPACITY: usize = 32;

/// Which externally observable field changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ChangeKind {
    Reachable,
    State,
    Location,
    Name,
}

impl ChangeKind {
    const ALL: [ChangeKind; 4] = [
        ChangeKind::Reachable,
        ChangeKind::State,
        ChangeKind::Location,
        ChangeKind::Name,
    ];

    pub const fn flag(self) -> ChangedMask {
        match self {
            ChangeKind::Reachable => ChangedMask::REACHABLE,
            ChangeKind::State => ChangedMask::STATE,
            ChangeKind::Location => ChangedMask::LOCATION,
            ChangeKind::Name => ChangedMask::NAME,
        }
    }

    fn from_flag(flag: ChangedMask) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.flag() == flag)
    }
}

bitflags! {
    /// Set of [`ChangeKind`]s reported in one notification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangedMask: u8 {
        const REACHABLE = 1 << 0;
        const STATE = 1 << 1;
        const LOCATION = 1 << 2;
        const NAME = 1 << 3;
    }
}

impl ChangedMask {
    /// The kinds in this mask, in bit order.
    pub fn kinds(self) -> impl Iterator<Item = ChangeKind> {
        self.iter().filter_map(ChangeKind::from_flag)
    }
}

impl From<ChangeKind> for ChangedMask {
    fn from(kind: ChangeKind) -> Self {
        kind.flag()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DeviceState {
    #[strum(to_string = "ON")]
    On,
    #[strum(to_string = "OFF")]
    Off,
}

/// Receives change notifications from a [`SubDevice`].
///
/// May be called from any thread, with no device lock held.
pub trait DeviceChangeObserver: Send + Sync {
    fn notify(&self, device: &SubDevice, changed: ChangedMask);
}

#[derive(Debug)]
struct Presence {
    name: heapless::String<NAME_CAPACITY>,
    location: heapless::String<LOCATION_CAPACITY>,
    state: DeviceState,
    reachable: bool,
}

/// One bridged device as seen by drivers.
pub struct SubDevice {
    presence: RwLock<Presence>,
    endpoint: AtomicU16,
    parent_endpoint: AtomicU16,
    observer: RwLock<Option<Weak<dyn DeviceChangeObserver>>>,
}

impl SubDevice {
    /// Create an unreachable, off device.
    pub fn new(name: &str, location: &str) -> Self {
        Self {
            presence: RwLock::new(Presence {
                name: bounded(name, "name"),
                location: bounded(location, "location"),
                state: DeviceState::Off,
                reachable: false,
            }),
            endpoint: AtomicU16::new(INVALID_ENDPOINT),
            parent_endpoint: AtomicU16::new(INVALID_ENDPOINT),
            observer: RwLock::new(None),
        }
    }

    pub fn name(&self) -> String {
        self.presence.read().name.as_str().to_owned()
    }

    pub fn location(&self) -> String {
        self.presence.read().location.as_str().to_owned()
    }

    pub fn state(&self) -> DeviceState {
        self.presence.read().state
    }

    pub fn is_on(&self) -> bool {
        self.state() == DeviceState::On
    }

    pub fn is_reachable(&self) -> bool {
        self.presence.read().reachable
    }

    pub fn endpoint(&self) -> EndptId {
        self.endpoint.load(Ordering::SeqCst)
    }

    pub fn set_endpoint(&self, endpoint: EndptId) {
        self.endpoint.store(endpoint, Ordering::SeqCst);
    }

    pub fn parent_endpoint(&self) -> EndptId {
        self.parent_endpoint.load(Ordering::SeqCst)
    }

    pub fn set_parent_endpoint(&self, endpoint: EndptId) {
        self.parent_endpoint.store(endpoint, Ordering::SeqCst);
    }

    /// Attach the observer. The device keeps only a weak reference.
    pub fn set_observer(&self, observer: &Arc<dyn DeviceChangeObserver>) {
        *self.observer.write() = Some(Arc::downgrade(observer));
    }

    pub fn clear_observer(&self) {
        *self.observer.write() = None;
    }

    pub fn set_on_off(&self, on: bool) {
        let state = if on { DeviceState::On } else { DeviceState::Off };
        let (changed, name) = {
            let mut presence = self.presence.write();
            let changed = presence.state != state;
            presence.state = state;
            (changed, presence.name.clone())
        };
        info!("Device[{}]: {}", name, state);
        if changed {
            self.notify(ChangedMask::STATE);
        }
    }

    pub fn toggle(&self) -> bool {
        let on = !self.is_on();
        self.set_on_off(on);
        on
    }

    pub fn set_reachable(&self, reachable: bool) {
        let (changed, name) = {
            let mut presence = self.presence.write();
            let changed = presence.reachable != reachable;
            presence.reachable = reachable;
            (changed, presence.name.clone())
        };
        if reachable {
            info!("Device[{}]: ONLINE", name);
        } else {
            info!("Device[{}]: OFFLINE", name);
        }
        if changed {
            self.notify(ChangedMask::REACHABLE);
        }
    }

    /// Rename the device. Names longer than [`NAME_CAPACITY`] are truncated.
    pub fn set_name(&self, name: &str) {
        let name = bounded::<NAME_CAPACITY>(name, "name");
        let (changed, old) = {
            let mut presence = self.presence.write();
            let old = std::mem::replace(&mut presence.name, name.clone());
            (old != name, old)
        };
        info!("Device[{}]: New Name=\"{}\"", old, name);
        if changed {
            self.notify(ChangedMask::NAME);
        }
    }

    /// Move the device. Locations longer than [`LOCATION_CAPACITY`] are truncated.
    pub fn set_location(&self, location: &str) {
        let location = bounded::<LOCATION_CAPACITY>(location, "location");
        let (changed, name) = {
            let mut presence = self.presence.write();
            let changed = presence.location != location;
            presence.location = location.clone();
            (changed, presence.name.clone())
        };
        info!("Device[{}]: Location=\"{}\"", name, location);
        if changed {
            self.notify(ChangedMask::LOCATION);
        }
    }

    fn notify(&self, changed: ChangedMask) {
        let observer = self.observer.read().as_ref().and_then(Weak::upgrade);
        if let Some(observer) = observer {
            observer.notify(self, changed);
        }
    }
}

impl fmt::Debug for SubDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let presence = self.presence.read();
        f.debug_struct("SubDevice")
            .field("name", &presence.name)
            .field("location", &presence.location)
            .field("state", &presence.state)
            .field("reachable", &presence.reachable)
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

/// Copy `value` into a bounded string, cutting at a char boundary if needed.
fn bounded<const N: usize>(value: &str, field: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for ch in value.chars() {
        if out.push(ch).is_err() {
            warn!("Truncating {} \"{}\" to {} bytes", field, value, N);
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, ChangedMask)>>,
    }

    impl DeviceChangeObserver for Recorder {
        fn notify(&self, device: &SubDevice, changed: ChangedMask) {
            self.seen.lock().push((device.name(), changed));
        }
    }

    fn observed(device: &SubDevice) -> (Arc<Recorder>, Arc<dyn DeviceChangeObserver>) {
        let recorder = Arc::new(Recorder::default());
        let observer: Arc<dyn DeviceChangeObserver> = recorder.clone();
        device.set_observer(&observer);
        (recorder, observer)
    }

    #[test]
    fn test_initial_state() {
        let device = SubDevice::new("Light 1", "Office");
        assert_eq!(device.name(), "Light 1");
        assert_eq!(device.location(), "Office");
        assert!(!device.is_on());
        assert!(!device.is_reachable());
        assert_eq!(device.endpoint(), INVALID_ENDPOINT);
    }

    #[test]
    fn test_set_on_off_twice_notifies_once() {
        let device = SubDevice::new("Light 1", "Office");
        let (recorder, _observer) = observed(&device);

        device.set_on_off(true);
        device.set_on_off(true);

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, ChangedMask::from(ChangeKind::State));
        assert!(device.is_on());
    }

    #[test]
    fn test_same_value_setters_do_not_notify() {
        let device = SubDevice::new("Light 2", "Office");
        let (recorder, _observer) = observed(&device);

        device.set_on_off(false);
        device.set_reachable(false);
        device.set_name("Light 2");
        device.set_location("Office");

        assert!(recorder.seen.lock().is_empty());
    }

    #[test]
    fn test_each_setter_reports_its_kind() {
        let device = SubDevice::new("Light 3", "Kitchen");
        let (recorder, _observer) = observed(&device);

        device.set_reachable(true);
        device.set_on_off(true);
        device.set_location("Den");
        device.set_name("Lamp");

        let kinds: Vec<ChangedMask> = recorder.seen.lock().iter().map(|(_, m)| *m).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Reachable.into(),
                ChangeKind::State.into(),
                ChangeKind::Location.into(),
                ChangeKind::Name.into(),
            ]
        );
        // The observer sees the new value.
        assert_eq!(recorder.seen.lock()[3].0, "Lamp");
    }

    #[test]
    fn test_dropped_observer_is_tolerated() {
        let device = SubDevice::new("Light 4", "Den");
        let (recorder, observer) = observed(&device);
        drop(observer);

        device.set_on_off(true);
        assert!(device.is_on());
        assert!(recorder.seen.lock().is_empty());
    }

    #[test]
    fn test_clear_observer() {
        let device = SubDevice::new("Light 4", "Den");
        let (recorder, _observer) = observed(&device);
        device.clear_observer();
        device.set_reachable(true);
        assert!(recorder.seen.lock().is_empty());
    }

    #[test]
    fn test_name_is_truncated_to_capacity() {
        let long = "x".repeat(NAME_CAPACITY + 10);
        let device = SubDevice::new(&long, "Office");
        assert_eq!(device.name().len(), NAME_CAPACITY);

        // Multi-byte characters are never split.
        let device = SubDevice::new(&"é".repeat(NAME_CAPACITY), "Office");
        assert_eq!(device.name().len(), NAME_CAPACITY);
        assert!(device.name().chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_toggle() {
        let device = SubDevice::new("Light 1", "Office");
        assert!(device.toggle());
        assert!(!device.toggle());
    }

    #[test]
    fn test_changed_mask_combines() {
        let mask = ChangedMask::REACHABLE | ChangedMask::NAME;
        assert!(mask.contains(ChangeKind::Reachable.flag()));
        assert!(mask.contains(ChangedMask::NAME));
        assert!(!mask.contains(ChangedMask::STATE));
        assert_eq!(mask.bits(), 0b1001);
        assert_eq!(
            mask.kinds().collect::<Vec<_>>(),
            vec![ChangeKind::Reachable, ChangeKind::Name]
        );
        assert!(ChangedMask::empty().is_empty());
        assert_eq!((mask | ChangedMask::STATE).bits(), 0b1011);
        assert_eq!(ChangedMask::all().kinds().count(), 4);
    }

    #[test]
    fn test_setters_from_other_threads() {
        let device = Arc::new(SubDevice::new("Light 1", "Office"));
        let (recorder, _observer) = observed(&device);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let device = device.clone();
                std::thread::spawn(move || device.set_on_off(i % 2 == 0))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every notification corresponds to an actual transition.
        let count = recorder.seen.lock().len();
        assert!((1..=4).contains(&count));
    }
}
