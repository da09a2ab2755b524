//! Device registry
//!
//! Drivers register a named entry into a boot stage with a priority inside
//! that stage. Boot initializes each stage in turn, running every entry's
//! init handler once in (stage, priority) order. Entries registered after
//! the scheduler started are initialized on the spot.
//!
//! The registry itself only does bookkeeping under the critical section;
//! driver handlers run with interrupts enabled and may block.

use heapless::Vec;

use crate::config::CFG_DEV_MAX;
use crate::core::cs_cell::CsCell;
use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::fatal::{os_fatal, FatalError};
use crate::types::{DevId, OsPrio, OsTick};

/// Boot stage a device is initialized in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum InitStage {
    Primary = 1,
    Secondary = 2,
    Kernel = 3,
}

impl InitStage {
    /// Every stage in boot order
    pub const ALL: [InitStage; 3] = [InitStage::Primary, InitStage::Secondary, InitStage::Kernel];
}

/// Registration flags
pub mod dev_flags {
    /// Boot cannot continue if this device fails to initialize
    pub const CRITICAL: u8 = 0x01;
}

/// Status bits
pub mod dev_status {
    /// Init handler has been run
    pub const INITED: u8 = 0x01;
    /// Init handler succeeded
    pub const READY: u8 = 0x02;
    /// At least one open reference
    pub const OPEN: u8 = 0x04;
    pub const SUSPENDED: u8 = 0x08;
}

/// Driver side of a registry entry
///
/// Only `init` is mandatory. `open` may block, for instance to take a
/// per-device mutex.
pub trait OsDevice: Sync {
    fn init(&self, dev: DevId) -> OsResult<()>;

    fn open(&self, _dev: DevId, _timeout: OsTick, _arg: usize) -> OsResult<()> {
        Ok(())
    }

    fn close(&self, _dev: DevId) -> OsResult<()> {
        Ok(())
    }

    fn suspend(&self, _dev: DevId, _until: OsTick, _force: bool) -> OsResult<()> {
        Ok(())
    }

    fn resume(&self, _dev: DevId) -> OsResult<()> {
        Ok(())
    }
}

struct DevEntry {
    name: &'static str,
    stage: InitStage,
    prio: OsPrio,
    flags: u8,
    status: u8,
    open_ref: u8,
    driver: &'static dyn OsDevice,
}

/// Snapshot of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevInfo {
    pub id: DevId,
    pub name: &'static str,
    pub stage: InitStage,
    pub prio: OsPrio,
    pub flags: u8,
    pub status: u8,
    pub open_ref: u8,
}

impl DevInfo {
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.status & dev_status::READY != 0
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status & dev_status::OPEN != 0
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.status & dev_status::SUSPENDED != 0
    }
}

pub struct DeviceRegistry {
    devs: Vec<DevEntry, CFG_DEV_MAX>,
    /// Boot order: by stage, then priority, then registration
    order: Vec<DevId, CFG_DEV_MAX>,
    started: bool,
}

impl DeviceRegistry {
    pub const fn new() -> Self {
        DeviceRegistry {
            devs: Vec::new(),
            order: Vec::new(),
            started: false,
        }
    }

    /// Forget every entry
    pub fn reset(&mut self) {
        self.devs.clear();
        self.order.clear();
        self.started = false;
    }

    /// From now on registration initializes immediately
    pub fn mark_started(&mut self) {
        self.started = true;
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.devs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.devs.is_empty()
    }

    fn entry(&self, id: DevId) -> OsResult<&DevEntry> {
        self.devs.get(id.index()).ok_or(OsError::DevNotFound)
    }

    fn entry_mut(&mut self, id: DevId) -> OsResult<&mut DevEntry> {
        self.devs.get_mut(id.index()).ok_or(OsError::DevNotFound)
    }

    /// Add an entry without running its init handler
    ///
    /// # Returns
    /// * `Ok(DevId)` - Handle of the new entry
    /// * `Err(OsError::DevExists)` - Name already registered
    /// * `Err(OsError::DevFull)` - Registry is full
    pub fn insert(
        &mut self,
        name: &'static str,
        stage: InitStage,
        prio: OsPrio,
        flags: u8,
        driver: &'static dyn OsDevice,
    ) -> OsResult<DevId> {
        if self.lookup(name).is_some() {
            return Err(OsError::DevExists);
        }

        let id = DevId(self.devs.len() as u8);
        self.devs
            .push(DevEntry {
                name,
                stage,
                prio,
                flags,
                status: 0,
                open_ref: 0,
                driver,
            })
            .map_err(|_| OsError::DevFull)?;

        let at = self
            .order
            .iter()
            .position(|&d| {
                let e = &self.devs[d.index()];
                (e.stage, e.prio) > (stage, prio)
            })
            .unwrap_or(self.order.len());
        self.order.insert(at, id).map_err(|_| OsError::DevFull)?;

        crate::debug!("dev '{}' registered, stage {} prio {}", name, stage, prio);
        Ok(id)
    }

    /// Register a device
    ///
    /// Once started, the init handler runs before this returns and its
    /// failure is reported; the entry stays registered but not ready.
    pub fn register(
        &mut self,
        name: &'static str,
        stage: InitStage,
        prio: OsPrio,
        flags: u8,
        driver: &'static dyn OsDevice,
    ) -> OsResult<DevId> {
        register(self, name, stage, prio, flags, driver)
    }

    /// Claim the init handler of `id`; it is handed out only once
    fn take_init(&mut self, id: DevId) -> OsResult<&'static dyn OsDevice> {
        let e = self.entry_mut(id)?;
        if e.status & dev_status::INITED != 0 {
            return Err(OsError::DevFailed);
        }
        e.status |= dev_status::INITED;
        Ok(e.driver)
    }

    /// Next entry of `stage` whose init handler has not run, claimed
    pub fn next_uninit(&mut self, stage: InitStage) -> Option<(DevId, &'static dyn OsDevice)> {
        let id = *self.order.iter().find(|&&d| {
            let e = &self.devs[d.index()];
            e.stage == stage && e.status & dev_status::INITED == 0
        })?;
        self.take_init(id).ok().map(|driver| (id, driver))
    }

    /// Record the outcome of an init handler
    ///
    /// # Returns
    /// * `Err(OsError::DevInitCritical)` - A critical device failed
    pub fn finish_init(&mut self, id: DevId, rc: OsResult<()>) -> OsResult<()> {
        let e = self.entry_mut(id)?;
        match rc {
            Ok(()) => {
                e.status |= dev_status::READY;
                Ok(())
            }
            Err(err) if e.flags & dev_flags::CRITICAL != 0 => {
                crate::error!("critical dev '{}' init failed: {}", e.name, err);
                Err(OsError::DevInitCritical)
            }
            Err(err) => {
                crate::warn!("dev '{}' init failed: {}", e.name, err);
                Ok(())
            }
        }
    }

    /// Run the init handlers of one stage in boot order
    ///
    /// Stops at the first critical failure. Non-critical failures leave the
    /// entry not ready and the sweep continues.
    pub fn initialize_all(&mut self, stage: InitStage) -> OsResult<()> {
        initialize_stage(self, stage)
    }

    pub fn lookup(&self, name: &str) -> Option<DevId> {
        self.devs
            .iter()
            .position(|e| e.name == name)
            .map(|i| DevId(i as u8))
    }

    pub fn info(&self, id: DevId) -> Option<DevInfo> {
        let e = self.devs.get(id.index())?;
        Some(DevInfo {
            id,
            name: e.name,
            stage: e.stage,
            prio: e.prio,
            flags: e.flags,
            status: e.status,
            open_ref: e.open_ref,
        })
    }

    /// Visit entries in boot order until `f` returns false
    pub fn walk(&self, mut f: impl FnMut(&DevInfo) -> bool) {
        for &id in self.order.iter() {
            if let Some(info) = self.info(id) {
                if !f(&info) {
                    break;
                }
            }
        }
    }

    /// First half of open: resolve `name` to a ready entry
    ///
    /// # Returns
    /// * `Err(OsError::DevNotFound)` - No such name
    /// * `Err(OsError::DevNotReady)` - Entry did not initialize
    pub fn prepare_open(&self, name: &str) -> OsResult<(DevId, &'static dyn OsDevice)> {
        let id = self.lookup(name).ok_or(OsError::DevNotFound)?;
        let e = self.entry(id)?;
        if e.status & dev_status::READY == 0 {
            return Err(OsError::DevNotReady);
        }
        Ok((id, e.driver))
    }

    /// Second half of open: count the reference
    pub fn commit_open(&mut self, id: DevId) -> OsResult<()> {
        let e = self.entry_mut(id)?;
        e.open_ref = e.open_ref.checked_add(1).ok_or(OsError::DevFailed)?;
        e.status |= dev_status::OPEN;
        Ok(())
    }

    pub fn open(&mut self, name: &str, timeout: OsTick, arg: usize) -> OsResult<DevId> {
        open(self, name, timeout, arg)
    }

    /// First half of close: the entry must hold a reference
    pub fn prepare_close(&self, id: DevId) -> OsResult<&'static dyn OsDevice> {
        let e = self.entry(id)?;
        if e.open_ref == 0 {
            return Err(OsError::DevNotOpen);
        }
        Ok(e.driver)
    }

    /// Second half of close: drop the reference
    pub fn commit_close(&mut self, id: DevId) -> OsResult<()> {
        let e = self.entry_mut(id)?;
        e.open_ref = e.open_ref.checked_sub(1).ok_or(OsError::DevNotOpen)?;
        if e.open_ref == 0 {
            e.status &= !dev_status::OPEN;
        }
        Ok(())
    }

    pub fn close(&mut self, id: DevId) -> OsResult<()> {
        close(self, id)
    }

    /// Driver of a ready entry, for suspend and resume
    pub fn ready_driver(&self, id: DevId) -> OsResult<&'static dyn OsDevice> {
        let e = self.entry(id)?;
        if e.status & dev_status::READY == 0 {
            return Err(OsError::DevNotReady);
        }
        Ok(e.driver)
    }

    pub fn set_suspended(&mut self, id: DevId, suspended: bool) -> OsResult<()> {
        let e = self.entry_mut(id)?;
        if suspended {
            e.status |= dev_status::SUSPENDED;
        } else {
            e.status &= !dev_status::SUSPENDED;
        }
        Ok(())
    }

    pub fn suspend(&mut self, id: DevId, until: OsTick, force: bool) -> OsResult<()> {
        suspend(self, id, until, force)
    }

    pub fn resume(&mut self, id: DevId) -> OsResult<()> {
        resume(self, id)
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Driver calls ============

/// How an operation reaches the registry between driver calls
///
/// Bookkeeping happens inside `with`; driver handlers are called outside of
/// it, so the global instance never holds the critical section across one.
trait RegistryAccess {
    fn with<R>(&mut self, f: impl FnOnce(&mut DeviceRegistry) -> R) -> R;
}

impl RegistryAccess for &mut DeviceRegistry {
    #[inline]
    fn with<R>(&mut self, f: impl FnOnce(&mut DeviceRegistry) -> R) -> R {
        f(&mut **self)
    }
}

fn register(
    mut reg: impl RegistryAccess,
    name: &'static str,
    stage: InitStage,
    prio: OsPrio,
    flags: u8,
    driver: &'static dyn OsDevice,
) -> OsResult<DevId> {
    let (id, started) = reg.with(|r| {
        r.insert(name, stage, prio, flags, driver)
            .map(|id| (id, r.is_started()))
    })?;

    if started {
        let driver = reg.with(|r| r.take_init(id))?;
        let rc = driver.init(id);
        reg.with(|r| r.finish_init(id, rc))?;
        rc?;
    }
    Ok(id)
}

fn initialize_stage(mut reg: impl RegistryAccess, stage: InitStage) -> OsResult<()> {
    while let Some((id, driver)) = reg.with(|r| r.next_uninit(stage)) {
        let rc = driver.init(id);
        reg.with(|r| r.finish_init(id, rc))?;
    }
    Ok(())
}

fn open(mut reg: impl RegistryAccess, name: &str, timeout: OsTick, arg: usize) -> OsResult<DevId> {
    let (id, driver) = reg.with(|r| r.prepare_open(name))?;
    driver.open(id, timeout, arg)?;
    reg.with(|r| r.commit_open(id))?;
    Ok(id)
}

fn close(mut reg: impl RegistryAccess, id: DevId) -> OsResult<()> {
    let driver = reg.with(|r| r.prepare_close(id))?;
    driver.close(id)?;
    reg.with(|r| r.commit_close(id))
}

fn suspend(mut reg: impl RegistryAccess, id: DevId, until: OsTick, force: bool) -> OsResult<()> {
    let driver = reg.with(|r| r.ready_driver(id))?;
    let rc = driver.suspend(id, until, force);
    // A forced suspend ignores the driver's objection
    if rc.is_ok() || force {
        reg.with(|r| r.set_suspended(id, true))?;
    }
    if force {
        Ok(())
    } else {
        rc
    }
}

fn resume(mut reg: impl RegistryAccess, id: DevId) -> OsResult<()> {
    let driver = reg.with(|r| r.ready_driver(id))?;
    driver.resume(id)?;
    reg.with(|r| r.set_suspended(id, false))
}

// ============ Global Instance ============

pub(crate) static DEVICES: CsCell<DeviceRegistry> = CsCell::new(DeviceRegistry::new());

#[inline]
fn with_devices<R>(f: impl FnOnce(&mut DeviceRegistry) -> R) -> R {
    critical_section(|cs| f(DEVICES.get(cs)))
}

/// The global registry, one critical section per access
struct Global;

impl RegistryAccess for Global {
    #[inline]
    fn with<R>(&mut self, f: impl FnOnce(&mut DeviceRegistry) -> R) -> R {
        with_devices(f)
    }
}

/// Register a device with the global registry
pub fn os_dev_create(
    name: &'static str,
    stage: InitStage,
    prio: OsPrio,
    flags: u8,
    driver: &'static dyn OsDevice,
) -> OsResult<DevId> {
    register(Global, name, stage, prio, flags, driver)
}

/// Boot sweep of one stage
///
/// A critical device failing to initialize is fatal.
pub fn os_dev_initialize_all(stage: InitStage) -> OsResult<()> {
    match initialize_stage(Global, stage) {
        Err(OsError::DevInitCritical) => os_fatal(FatalError::DevInitFailed),
        other => other,
    }
}

/// Open a device by name
///
/// The driver's open handler may block for up to `timeout` ticks.
pub fn os_dev_open(name: &str, timeout: OsTick, arg: usize) -> OsResult<DevId> {
    open(Global, name, timeout, arg)
}

pub fn os_dev_close(id: DevId) -> OsResult<()> {
    close(Global, id)
}

pub fn os_dev_suspend(id: DevId, until: OsTick, force: bool) -> OsResult<()> {
    suspend(Global, id, until, force)
}

pub fn os_dev_resume(id: DevId) -> OsResult<()> {
    resume(Global, id)
}

pub fn os_dev_lookup(name: &str) -> Option<DevId> {
    with_devices(|r| r.lookup(name))
}

pub fn os_dev_info(id: DevId) -> Option<DevInfo> {
    with_devices(|r| r.info(id))
}

/// Visit entries in boot order. `f` runs with interrupts masked.
pub fn os_dev_walk(f: impl FnMut(&DevInfo) -> bool) {
    with_devices(|r| r.walk(f))
}

/// Drop every registration
pub fn os_dev_reset() {
    with_devices(|r| r.reset())
}
