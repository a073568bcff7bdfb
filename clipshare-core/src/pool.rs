//! A pool of reusable transient objects.
//!
//! Instances are created lazily through a factory and handed back with
//! [`ResourcePool::recycle`], which resets them before they become idle. An
//! instance is either borrowed by exactly one owner or idle in the pool.

use std::fmt;

/// A resource that can be returned to a clean state for reuse.
pub trait Poolable {
    fn reset(&mut self);
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

pub struct ResourcePool<T> {
    factory: Factory<T>,
    idle: Vec<T>,
    max_idle: Option<usize>,
    allocated: usize,
    in_use: usize,
    peak_in_use: usize,
}

impl<T: Poolable> ResourcePool<T> {
    pub fn new(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            idle: Vec::new(),
            max_idle: None,
            allocated: 0,
            in_use: 0,
            peak_in_use: 0,
        }
    }

    /// Cap the idle list; recycled instances beyond the cap are dropped.
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Borrow an instance, allocating only when no idle one is available.
    pub fn get(&mut self) -> T {
        let instance = match self.idle.pop() {
            Some(instance) => instance,
            None => {
                self.allocated += 1;
                (self.factory)()
            }
        };

        self.in_use += 1;
        self.peak_in_use = self.peak_in_use.max(self.in_use);
        instance
    }

    /// Return a borrowed instance.
    pub fn recycle(&mut self, mut instance: T) {
        instance.reset();
        self.in_use = self.in_use.saturating_sub(1);

        if self.max_idle.is_some_and(|max| self.idle.len() >= max) {
            return;
        }
        self.idle.push(instance);
    }

    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Total instances ever created by the factory.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Highest number of instances borrowed at the same time.
    pub fn peak_in_use(&self) -> usize {
        self.peak_in_use
    }
}

impl<T> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("idle", &self.idle.len())
            .field("max_idle", &self.max_idle)
            .field("allocated", &self.allocated)
            .field("in_use", &self.in_use)
            .field("peak_in_use", &self.peak_in_use)
            .finish()
    }
}
