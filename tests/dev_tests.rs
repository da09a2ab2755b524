//! Device registry tests
//!
//! Drivers are leaked so they satisfy the `'static` registration bound.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;

use tickos::dev::{dev_flags, dev_status, DeviceRegistry, InitStage, OsDevice};
use tickos::error::{OsError, OsResult};
use tickos::types::{DevId, OsTick};

type Log = StdMutex<Vec<&'static str>>;

struct FakeDriver {
    tag: &'static str,
    init_rc: OsResult<()>,
    suspend_rc: OsResult<()>,
    log: &'static Log,
    opens: AtomicU32,
    closes: AtomicU32,
    last_arg: AtomicU32,
}

impl OsDevice for FakeDriver {
    fn init(&self, _dev: DevId) -> OsResult<()> {
        self.log.lock().unwrap().push(self.tag);
        self.init_rc
    }

    fn open(&self, _dev: DevId, _timeout: OsTick, arg: usize) -> OsResult<()> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        self.last_arg.store(arg as u32, Ordering::Relaxed);
        Ok(())
    }

    fn close(&self, _dev: DevId) -> OsResult<()> {
        self.closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn suspend(&self, _dev: DevId, _until: OsTick, _force: bool) -> OsResult<()> {
        self.suspend_rc
    }
}

fn new_log() -> &'static Log {
    Box::leak(Box::new(StdMutex::new(Vec::new())))
}

fn driver_with(tag: &'static str, init_rc: OsResult<()>, log: &'static Log) -> &'static FakeDriver {
    Box::leak(Box::new(FakeDriver {
        tag,
        init_rc,
        suspend_rc: Ok(()),
        log,
        opens: AtomicU32::new(0),
        closes: AtomicU32::new(0),
        last_arg: AtomicU32::new(0),
    }))
}

fn driver(tag: &'static str, log: &'static Log) -> &'static FakeDriver {
    driver_with(tag, Ok(()), log)
}

/// Registry with one ready device named "uart"
fn with_uart() -> (DeviceRegistry, DevId, &'static FakeDriver) {
    let mut r = DeviceRegistry::new();
    let p = driver("uart", new_log());
    let id = r.insert("uart", InitStage::Primary, 0, 0, p).unwrap();
    r.initialize_all(InitStage::Primary).unwrap();
    (r, id, p)
}

#[cfg(test)]
mod init_tests {
    use super::*;

    #[test]
    fn test_init_order_by_stage_and_priority() {
        let log = new_log();
        let mut r = DeviceRegistry::new();
        r.insert("p5", InitStage::Primary, 5, 0, driver("p5", log)).unwrap();
        r.insert("p1", InitStage::Primary, 1, 0, driver("p1", log)).unwrap();
        r.insert("s0", InitStage::Secondary, 0, 0, driver("s0", log)).unwrap();

        for stage in InitStage::ALL {
            r.initialize_all(stage).unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec!["p1", "p5", "s0"]);

        let mut walked = Vec::new();
        r.walk(|d| {
            walked.push(d.name);
            true
        });
        assert_eq!(walked, vec!["p1", "p5", "s0"]);
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let log = new_log();
        let mut r = DeviceRegistry::new();
        r.insert("a", InitStage::Primary, 3, 0, driver("a", log)).unwrap();
        r.insert("b", InitStage::Primary, 3, 0, driver("b", log)).unwrap();
        r.insert("c", InitStage::Primary, 3, 0, driver("c", log)).unwrap();
        r.initialize_all(InitStage::Primary).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_stage_sweep_only_touches_its_stage() {
        let log = new_log();
        let mut r = DeviceRegistry::new();
        let k = r.insert("k", InitStage::Kernel, 0, 0, driver("k", log)).unwrap();
        let p = r.insert("p", InitStage::Primary, 9, 0, driver("p", log)).unwrap();

        r.initialize_all(InitStage::Primary).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["p"]);
        assert!(r.info(p).unwrap().is_ready());
        assert_eq!(r.info(k).unwrap().status, 0);

        // A second sweep never repeats an init handler
        r.initialize_all(InitStage::Primary).unwrap();
        r.initialize_all(InitStage::Kernel).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["p", "k"]);
    }

    #[test]
    fn test_non_critical_failure_continues() {
        let log = new_log();
        let mut r = DeviceRegistry::new();
        let bad = r
            .insert("bad", InitStage::Primary, 0, 0, driver_with("bad", Err(OsError::DevFailed), log))
            .unwrap();
        let good = r.insert("good", InitStage::Primary, 1, 0, driver("good", log)).unwrap();

        assert_eq!(r.initialize_all(InitStage::Primary), Ok(()));
        assert_eq!(*log.lock().unwrap(), vec!["bad", "good"]);

        let info = r.info(bad).unwrap();
        assert_eq!(info.status, dev_status::INITED);
        assert!(!info.is_ready());
        assert!(r.info(good).unwrap().is_ready());
        assert_eq!(r.open("bad", 0, 0), Err(OsError::DevNotReady));
    }

    #[test]
    fn test_critical_failure_stops_sweep() {
        let log = new_log();
        let mut r = DeviceRegistry::new();
        r.insert(
            "clock",
            InitStage::Primary,
            0,
            dev_flags::CRITICAL,
            driver_with("clock", Err(OsError::DevFailed), log),
        )
        .unwrap();
        r.insert("later", InitStage::Primary, 1, 0, driver("later", log)).unwrap();

        assert_eq!(r.initialize_all(InitStage::Primary), Err(OsError::DevInitCritical));
        assert_eq!(*log.lock().unwrap(), vec!["clock"]);
    }

    // The only test here that touches the global registry
    #[test]
    #[should_panic(expected = "DevInitFailed")]
    fn test_boot_sweep_critical_failure_is_fatal() {
        let log = new_log();
        tickos::dev::os_dev_reset();
        tickos::dev::os_dev_create(
            "clock",
            InitStage::Primary,
            0,
            dev_flags::CRITICAL,
            driver_with("clock", Err(OsError::DevFailed), log),
        )
        .unwrap();

        let _ = tickos::dev::os_dev_initialize_all(InitStage::Primary);
    }

    #[test]
    fn test_register_after_start_inits_immediately() {
        let log = new_log();
        let mut r = DeviceRegistry::new();
        r.mark_started();

        let id = r.register("spi", InitStage::Secondary, 4, 0, driver("spi", log)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["spi"]);
        assert!(r.info(id).unwrap().is_ready());

        let broken = driver_with("i2c", Err(OsError::DevFailed), log);
        assert_eq!(
            r.register("i2c", InitStage::Secondary, 5, 0, broken),
            Err(OsError::DevFailed)
        );
        // Registered, just not usable
        let i2c = r.lookup("i2c").unwrap();
        assert!(!r.info(i2c).unwrap().is_ready());
    }

    #[test]
    fn test_register_before_start_defers_init() {
        let log = new_log();
        let mut r = DeviceRegistry::new();
        let id = r.register("adc", InitStage::Primary, 0, 0, driver("adc", log)).unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert!(!r.info(id).unwrap().is_ready());
    }

    #[test]
    fn test_duplicate_name() {
        let log = new_log();
        let mut r = DeviceRegistry::new();
        r.insert("dup", InitStage::Primary, 0, 0, driver("dup", log)).unwrap();
        assert_eq!(
            r.insert("dup", InitStage::Kernel, 1, 0, driver("dup", log)),
            Err(OsError::DevExists)
        );
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_registry_full() {
        const NAMES: [&str; 33] = [
            "d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7", "d8", "d9", "d10", "d11", "d12",
            "d13", "d14", "d15", "d16", "d17", "d18", "d19", "d20", "d21", "d22", "d23", "d24",
            "d25", "d26", "d27", "d28", "d29", "d30", "d31", "d32",
        ];
        let log = new_log();
        let mut r = DeviceRegistry::new();
        let (last, rest) = NAMES.split_last().unwrap();
        for &name in rest {
            r.insert(name, InitStage::Primary, 0, 0, driver(name, log)).unwrap();
        }
        assert_eq!(
            r.insert(last, InitStage::Primary, 0, 0, driver(last, log)),
            Err(OsError::DevFull)
        );
        assert_eq!(r.len(), tickos::config::CFG_DEV_MAX);
    }
}

#[cfg(test)]
mod open_tests {
    use super::*;

    #[test]
    fn test_open_close_refcount() {
        let (mut r, id, p) = with_uart();

        assert_eq!(r.open("uart", 10, 115200), Ok(id));
        assert_eq!(r.open("uart", 10, 9600), Ok(id));
        let info = r.info(id).unwrap();
        assert_eq!(info.open_ref, 2);
        assert!(info.is_open());
        assert_eq!(p.opens.load(Ordering::Relaxed), 2);
        assert_eq!(p.last_arg.load(Ordering::Relaxed), 9600);

        r.close(id).unwrap();
        assert!(r.info(id).unwrap().is_open());
        r.close(id).unwrap();
        assert!(!r.info(id).unwrap().is_open());
        assert_eq!(p.closes.load(Ordering::Relaxed), 2);

        assert_eq!(r.close(id), Err(OsError::DevNotOpen));
        assert_eq!(p.closes.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_open_unknown_or_uninitialized() {
        let (mut r, _, _) = with_uart();
        assert_eq!(r.open("nope", 0, 0), Err(OsError::DevNotFound));

        r.insert("late", InitStage::Kernel, 0, 0, driver("late", new_log())).unwrap();
        assert_eq!(r.open("late", 0, 0), Err(OsError::DevNotReady));
    }

    #[test]
    fn test_lookup_and_info() {
        let (r, id, _) = with_uart();
        assert_eq!(r.lookup("uart"), Some(id));
        assert_eq!(r.lookup("UART"), None);

        let info = r.info(id).unwrap();
        assert_eq!(info.name, "uart");
        assert_eq!(info.stage, InitStage::Primary);
        assert_eq!(info.status, dev_status::INITED | dev_status::READY);
    }

    #[test]
    fn test_walk_stops_early() {
        let log = new_log();
        let mut r = DeviceRegistry::new();
        for (name, prio) in [("x", 2), ("y", 1), ("z", 3)] {
            r.insert(name, InitStage::Secondary, prio, 0, driver(name, log)).unwrap();
        }

        let mut seen = Vec::new();
        r.walk(|d| {
            seen.push(d.name);
            d.name != "x"
        });
        assert_eq!(seen, vec!["y", "x"]);
    }
}

#[cfg(test)]
mod power_tests {
    use super::*;

    #[test]
    fn test_suspend_resume() {
        let (mut r, id, _) = with_uart();
        r.suspend(id, 100, false).unwrap();
        assert!(r.info(id).unwrap().is_suspended());
        r.resume(id).unwrap();
        assert!(!r.info(id).unwrap().is_suspended());
    }

    #[test]
    fn test_driver_refuses_suspend() {
        let log = new_log();
        let stubborn: &'static FakeDriver = Box::leak(Box::new(FakeDriver {
            tag: "radio",
            init_rc: Ok(()),
            suspend_rc: Err(OsError::DevFailed),
            log,
            opens: AtomicU32::new(0),
            closes: AtomicU32::new(0),
            last_arg: AtomicU32::new(0),
        }));
        let mut r = DeviceRegistry::new();
        let id = r.insert("radio", InitStage::Primary, 0, 0, stubborn).unwrap();
        r.initialize_all(InitStage::Primary).unwrap();

        assert_eq!(r.suspend(id, 50, false), Err(OsError::DevFailed));
        assert!(!r.info(id).unwrap().is_suspended());

        // Forced suspend overrides the driver
        assert_eq!(r.suspend(id, 50, true), Ok(()));
        assert!(r.info(id).unwrap().is_suspended());
    }

    #[test]
    fn test_suspend_needs_ready_device() {
        let mut r = DeviceRegistry::new();
        let id = r.insert("cold", InitStage::Primary, 0, 0, driver("cold", new_log())).unwrap();
        assert_eq!(r.suspend(id, 0, true), Err(OsError::DevNotReady));
        assert_eq!(r.resume(id), Err(OsError::DevNotReady));
    }

    #[test]
    fn test_reset_clears_everything() {
        let (mut r, _, _) = with_uart();
        r.mark_started();
        r.reset();
        assert!(r.is_empty());
        assert!(!r.is_started());
        assert_eq!(r.lookup("uart"), None);
    }
}
