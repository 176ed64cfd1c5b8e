//! Unit tests for device-scoped handles and HandleMap

use super::*;

// ============================================================================
// DEVICE ID TESTS
// ============================================================================

#[test]
fn test_device_ids_are_unique_and_non_zero() {
    let a = DeviceId::next();
    let b = DeviceId::next();
    assert_ne!(a, b);
    assert_ne!(a, DeviceId::default());
    assert_ne!(b, DeviceId::default());
}

// ============================================================================
// HANDLE MAP TESTS
// ============================================================================

#[test]
fn test_insert_get_remove() {
    let mut map: HandleMap<BufferHandle, u32> = HandleMap::new(DeviceId::next());
    let handle = map.insert(7);

    assert_eq!(handle.device(), map.device());
    assert_eq!(map.get(handle), Some(&7));
    assert!(map.contains_key(handle));

    assert_eq!(map.remove(handle), Some(7));
    assert_eq!(map.get(handle), None);
    assert_eq!(map.remove(handle), None);
}

#[test]
fn test_recycled_slot_does_not_resolve_old_handle() {
    let mut map: HandleMap<TextureHandle, &str> = HandleMap::new(DeviceId::next());
    let old = map.insert("old");
    map.remove(old);
    let new = map.insert("new");

    assert_ne!(old, new);
    assert_eq!(map.get(old), None);
    assert_eq!(map.get(new), Some(&"new"));
}

#[test]
fn test_handle_from_other_map_does_not_resolve() {
    let mut a: HandleMap<BufferHandle, u32> = HandleMap::new(DeviceId::next());
    let mut b: HandleMap<BufferHandle, u32> = HandleMap::new(DeviceId::next());
    let from_a = a.insert(1);
    let from_b = b.insert(2);

    assert_eq!(b.get(from_a), None);
    assert!(!b.contains_key(from_a));
    assert_eq!(b.get_mut(from_a), None);
    assert_eq!(b.remove(from_a), None);
    assert_eq!(b.get(from_b), Some(&2));
    assert_eq!(a.get(from_a), Some(&1));
}

#[test]
fn test_default_handle_never_resolves() {
    let mut map: HandleMap<FenceHandle, u32> = HandleMap::new(DeviceId::next());
    map.insert(1);
    assert_eq!(map.get(FenceHandle::default()), None);
}

#[test]
fn test_get_disjoint_mut() {
    let mut map: HandleMap<BufferHandle, u32> = HandleMap::new(DeviceId::next());
    let x = map.insert(1);
    let y = map.insert(2);

    if let Some([a, b]) = map.get_disjoint_mut([x, y]) {
        std::mem::swap(a, b);
    }
    assert_eq!(map.get(x), Some(&2));
    assert_eq!(map.get(y), Some(&1));

    assert!(map.get_disjoint_mut([x, x]).is_none());
    let mut other: HandleMap<BufferHandle, u32> = HandleMap::new(DeviceId::next());
    let foreign = other.insert(3);
    assert!(map.get_disjoint_mut([x, foreign]).is_none());
}

#[test]
fn test_drain_and_iter_rebuild_handles() {
    let mut map: HandleMap<SamplerHandle, u32> = HandleMap::new(DeviceId::next());
    let first = map.insert(10);
    let second = map.insert(20);

    let mut seen: Vec<_> = map.iter().map(|(handle, &value)| (handle, value)).collect();
    seen.sort_by_key(|&(_, value)| value);
    assert_eq!(seen, vec![(first, 10), (second, 20)]);

    let drained: Vec<_> = map.drain().collect();
    assert_eq!(drained.len(), 2);
    assert!(map.is_empty());
    assert_eq!(map.get(first), None);
}
