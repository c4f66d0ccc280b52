/// Lifecycle state of a proxy slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProxyStatus {
    /// Never created.
    #[default]
    Inactive,
    /// Created; hardware resources exist.
    Active,
    /// Destroyed; hardware resources were scheduled for destruction.
    Obsolete,
}

#[derive(Debug, Default)]
struct Slot<T> {
    status: ProxyStatus,
    data: T,
}

/// Fixed-capacity dense pool of proxies addressed by slot index.
///
/// The simulation side owns index allocation; the pool only mirrors it. The
/// capacity is fixed at construction and never grows.
#[derive(Debug)]
pub struct ProxyPool<T> {
    kind: &'static str,
    slots: Vec<Slot<T>>,
    active: usize,
}

impl<T: Default> ProxyPool<T> {
    pub fn new(kind: &'static str, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        Self {
            kind,
            slots,
            active: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of active slots.
    pub fn active_count(&self) -> usize {
        self.active
    }

    fn slot(&self, index: u32) -> &Slot<T> {
        let index = index as usize;
        assert!(
            index < self.slots.len(),
            "{} index {} out of range (capacity {})",
            self.kind,
            index,
            self.slots.len()
        );
        &self.slots[index]
    }

    fn slot_mut(&mut self, index: u32) -> &mut Slot<T> {
        let capacity = self.slots.len();
        let index = index as usize;
        assert!(
            index < capacity,
            "{} index {} out of range (capacity {})",
            self.kind,
            index,
            capacity
        );
        &mut self.slots[index]
    }

    pub fn status(&self, index: u32) -> ProxyStatus {
        self.slot(index).status
    }

    pub fn is_active(&self, index: u32) -> bool {
        self.status(index) == ProxyStatus::Active
    }

    /// Mark a slot active and return its (default) data for filling in.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already active.
    pub fn activate(&mut self, index: u32) -> &mut T {
        let kind = self.kind;
        let slot = self.slot_mut(index);
        assert!(
            slot.status != ProxyStatus::Active,
            "{kind} {index} created while still active"
        );
        slot.status = ProxyStatus::Active;
        slot.data = T::default();
        self.active += 1;
        &mut self.slots[index as usize].data
    }

    /// Mark an active slot obsolete and take its data, leaving the default
    /// (null hardware ids) behind.
    ///
    /// # Panics
    ///
    /// Panics if the slot is not active.
    pub fn retire(&mut self, index: u32) -> T {
        let kind = self.kind;
        let slot = self.slot_mut(index);
        assert!(
            slot.status == ProxyStatus::Active,
            "{kind} {index} destroyed while {:?}",
            slot.status
        );
        slot.status = ProxyStatus::Obsolete;
        let data = std::mem::take(&mut slot.data);
        self.active -= 1;
        data
    }

    /// Direct slot lookup. Whether the slot is active is the caller's concern.
    pub fn get(&self, index: u32) -> &T {
        &self.slot(index).data
    }

    pub fn get_mut(&mut self, index: u32) -> &mut T {
        &mut self.slot_mut(index).data
    }

    /// Active slots with their indices.
    pub fn iter_active(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.status == ProxyStatus::Active)
            .map(|(index, slot)| (index as u32, &slot.data))
    }

    /// Indices of active slots.
    pub fn active_indices(&self) -> Vec<u32> {
        self.iter_active().map(|(index, _)| index).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut pool: ProxyPool<u32> = ProxyPool::new("thing", 4);
        assert_eq!(pool.status(2), ProxyStatus::Inactive);

        *pool.activate(2) = 42;
        assert!(pool.is_active(2));
        assert_eq!(pool.active_count(), 1);

        assert_eq!(pool.retire(2), 42);
        assert_eq!(pool.status(2), ProxyStatus::Obsolete);
        assert_eq!(*pool.get(2), 0);

        *pool.activate(2) = 7;
        assert_eq!(pool.iter_active().collect::<Vec<_>>(), vec![(2, &7)]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_panics() {
        let pool: ProxyPool<u32> = ProxyPool::new("thing", 4);
        pool.status(4);
    }

    #[test]
    #[should_panic(expected = "still active")]
    fn test_double_create_panics() {
        let mut pool: ProxyPool<u32> = ProxyPool::new("thing", 4);
        pool.activate(1);
        pool.activate(1);
    }

    #[test]
    #[should_panic(expected = "destroyed while Inactive")]
    fn test_destroy_inactive_panics() {
        let mut pool: ProxyPool<u32> = ProxyPool::new("thing", 4);
        pool.retire(0);
    }
}
