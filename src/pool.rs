use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::ServeError;
use crate::model::{ModelHandle, PipeGroup};

/// Owns every pipe group that exists. At any instant the free list plus
/// the groups checked out by callers partition all created groups.
///
/// Two locks on purpose: the free list is cheap and hot, provisioning is
/// slow and rare. Reuse never waits behind creation.
pub struct PipePool {
    free: Mutex<Vec<PipeGroup>>,
    provision: Mutex<()>,
    model: ModelHandle,
    created: AtomicUsize,
}

impl PipePool {
    pub fn new(model: ModelHandle) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            provision: Mutex::new(()),
            model,
            created: AtomicUsize::new(0),
        }
    }

    /// Pop a recycled group, or provision a new one when none is free.
    /// Provisioning failure is fatal for the request: there is no
    /// fallback evaluation path.
    pub fn acquire(&self) -> Result<PipeGroup, ServeError> {
        if let Some(group) = self.free.lock().unwrap().pop() {
            return Ok(group);
        }
        // Not holding the free-list lock here: concurrent releases and
        // reuse proceed while a new group is built.
        let _provisioning = self.provision.lock().unwrap();
        let group = self.model.get_pipes()?;
        self.created.fetch_add(1, Ordering::Relaxed);
        log::info!("provisioned pipe group #{}", self.created.load(Ordering::Relaxed));
        Ok(group)
    }

    /// Return a group to the free list. Callers do this on every exit
    /// path, failed evaluations included.
    pub fn release(&self, group: PipeGroup) {
        self.free.lock().unwrap().push(group);
    }

    /// Total groups ever provisioned.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Groups currently on the free list.
    pub fn free_len(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}
