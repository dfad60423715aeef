pub mod sub_device;

pub use sub_device::{
    ChangeKind, ChangedMask, DeviceChangeObserver, DeviceState, LOCATION_CAPACITY, NAME_CAPACITY,
    SubDevice,
};
