//! Unit tests for core RTOS modules
//!
//! These tests run on the host (not embedded target) to verify
//! the core algorithms work correctly.

#[cfg(test)]
mod prio_tests {
    use tickos::config::CFG_PRIO_MAX;
    use tickos::prio::PrioSet;

    #[test]
    fn test_empty_set() {
        let set = PrioSet::new();
        assert_eq!(set.highest(), None);
        assert!(!set.is_claimed(0));
    }

    #[test]
    fn test_claim_is_exclusive() {
        let mut set = PrioSet::new();
        assert!(set.claim(5));
        assert!(!set.claim(5));
        assert!(set.is_claimed(5));
        assert!(!set.is_claimed(4));
        assert_eq!(set.highest(), Some(5));
    }

    #[test]
    fn test_highest_of_many() {
        let mut set = PrioSet::new();

        // Claim in random order
        for prio in [20, 5, 10, 33] {
            set.claim(prio);
        }
        assert_eq!(set.highest(), Some(5));

        set.claim(0);
        assert_eq!(set.highest(), Some(0));
    }

    #[test]
    fn test_boundary_priorities() {
        let mut set = PrioSet::new();
        let last = (CFG_PRIO_MAX - 1) as u8;

        set.claim(last);
        assert_eq!(set.highest(), Some(last));
        set.claim(31);
        set.claim(32);
        assert_eq!(set.highest(), Some(31));
    }

    #[test]
    fn test_clear() {
        let mut set = PrioSet::new();
        for prio in 0..CFG_PRIO_MAX as u8 {
            assert!(set.claim(prio));
        }
        set.clear();
        assert_eq!(set.highest(), None);
        assert!(set.claim(7));
    }
}

#[cfg(test)]
mod error_tests {
    use tickos::error::OsError;

    #[test]
    fn test_error_variants() {
        let err = OsError::Timeout;
        assert_eq!(err, OsError::Timeout);
        assert_ne!(err, OsError::QFull);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(OsError::MutexNotOwner.code(), 22401);
        assert_eq!(OsError::Timeout.code(), 29401);
        assert_eq!(OsError::DevNotFound.code(), 30001);
        assert_ne!(OsError::DevNotReady.code(), OsError::DevNotOpen.code());
    }

    #[test]
    fn test_error_debug() {
        let s = format!("{:?}", OsError::SemOvf);
        assert_eq!(s, "SemOvf");
    }
}

#[cfg(test)]
mod types_tests {
    use tickos::kernel::Kernel;
    use tickos::task::TaskContext;
    use tickos::types::*;

    #[test]
    fn test_tick_compare_wraps() {
        assert!(tick_lt(1, 2));
        assert!(!tick_lt(2, 2));
        assert!(tick_leq(2, 2));
        assert!(tick_lt(u32::MAX - 1, 3));
        assert!(!tick_lt(3, u32::MAX - 1));
    }

    #[test]
    fn test_pend_helpers() {
        assert!(Pend::<u8>::Blocked.is_blocked());
        assert!(!Pend::Ready(3u8).is_blocked());
        assert_eq!(Pend::Ready(3u8).ready(), Some(3));
        assert_eq!(Pend::<u8>::Blocked.ready(), None);
    }

    #[test]
    fn test_evq_set() {
        let mut k = Kernel::new();
        k.init(Default::default(), TaskContext::detached()).unwrap();
        let a = k.evq_create().unwrap();
        let b = k.evq_create().unwrap();

        let set = EvqSet::EMPTY.with(b).with(a);
        assert!(!set.is_empty());
        assert!(set.contains(a));
        assert!(!set.contains(k.evq_dflt().unwrap()));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![a, b]);
        assert!(EvqSet::default().is_empty());
    }

    #[test]
    fn test_timeout_constants() {
        assert_eq!(OS_NO_WAIT, 0);
        assert_eq!(OS_TIMEOUT_NEVER, u32::MAX);
    }
}

#[cfg(test)]
mod config_tests {
    use tickos::config::*;

    #[test]
    fn test_config_values() {
        assert!(CFG_PRIO_MAX >= 8, "Need at least 8 priority levels");
        assert!(CFG_PRIO_MAX <= 256, "Too many priority levels");

        assert!(CFG_STK_SIZE_MIN >= 32, "Stack too small");

        assert!(CFG_TICK_RATE_HZ >= 10, "Tick rate too slow");
        assert!(CFG_TICK_RATE_HZ <= 10000, "Tick rate too fast");

        // Idle priority should be lowest
        assert_eq!(CFG_PRIO_IDLE, (CFG_PRIO_MAX - 1) as u8);

        assert!(CFG_EVQ_MAX <= 32, "Queue sets are 32 bit");
        assert_eq!(CFG_TIMER_MAX, CFG_TASK_MAX + CFG_CALLOUT_MAX);
    }

    #[test]
    fn test_default_unwind_policy() {
        assert_eq!(KernelConfig::default().inherit_unwind, InheritUnwind::OnTimeout);
    }
}

/// The only test in this file that touches the global kernel
#[cfg(test)]
mod global_api_tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tickos::dev::{self, InitStage, OsDevice};
    use tickos::types::{DevId, OsTick, OS_NO_WAIT};
    use tickos::*;

    static LED_INITS: AtomicU32 = AtomicU32::new(0);
    static LED_OPENS: AtomicU32 = AtomicU32::new(0);

    struct Led;

    impl OsDevice for Led {
        fn init(&self, _dev: DevId) -> OsResult<()> {
            LED_INITS.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn open(&self, _dev: DevId, _timeout: OsTick, _arg: usize) -> OsResult<()> {
            LED_OPENS.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    static LED: Led = Led;

    fn worker(_: usize) -> ! {
        loop {}
    }

    #[test]
    fn test_global_api_before_start() {
        os_init().unwrap();
        assert!(kernel::OS_FLAGS.is_initialized());
        assert!(!kernel::OS_FLAGS.is_running());
        assert_eq!(os_time_get(), 0);

        // Tasks
        let short: &'static mut [u32] = Box::leak(vec![0u32; 8].into_boxed_slice());
        assert_eq!(
            os_task_create(short, "short", worker, 0, 3),
            Err(OsError::StkSizeInvalid)
        );
        let stack: &'static mut [u32] = Box::leak(vec![0u32; 256].into_boxed_slice());
        let t = os_task_create(stack, "worker", worker, 7, 3).unwrap();
        let info = task::os_task_info(t).unwrap();
        assert_eq!((info.name, info.prio), ("worker", 3));
        assert_eq!(sched::os_sched_current(), None);

        // Semaphore: never blocks when a token is there
        let sem = Semaphore::create(1).unwrap();
        assert_eq!(sem.wait(OS_NO_WAIT), Ok(()));
        assert_eq!(sem.wait(OS_NO_WAIT), Err(OsError::Timeout));
        sem.signal().unwrap();
        assert_eq!(sem.count(), 1);

        // Mutex needs a running task
        let m = Mutex::create().unwrap();
        assert_eq!(m.lock(OS_NO_WAIT), Err(OsError::OsNotRunning));
        assert!(!m.is_owned());

        // Default queue
        let q = EventQueue::dflt().unwrap();
        q.put(Event::message(1, 2)).unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q.get_no_wait(), Ok(Some(Event::message(1, 2))));
        assert!(q.is_empty());

        let c = Callout::create(q.id()).unwrap();
        c.reset(10).unwrap();
        assert!(c.is_armed());
        assert_eq!(c.remaining_ticks(), Some(10));
        c.stop().unwrap();
        assert!(!c.is_armed());

        // Devices
        let led = dev::os_dev_create("led", InitStage::Primary, 0, 0, &LED).unwrap();
        assert_eq!(LED_INITS.load(Ordering::Relaxed), 0);
        assert_eq!(dev::os_dev_open("led", 0, 0), Err(OsError::DevNotReady));
        for stage in InitStage::ALL {
            dev::os_dev_initialize_all(stage).unwrap();
        }
        assert_eq!(LED_INITS.load(Ordering::Relaxed), 1);
        assert_eq!(dev::os_dev_lookup("led"), Some(led));

        assert_eq!(dev::os_dev_open("led", 0, 0), Ok(led));
        assert_eq!(LED_OPENS.load(Ordering::Relaxed), 1);
        assert_eq!(dev::os_dev_info(led).unwrap().open_ref, 1);
        dev::os_dev_close(led).unwrap();
        assert_eq!(dev::os_dev_close(led), Err(OsError::DevNotOpen));

        let mut n = 0;
        dev::os_dev_walk(|_| {
            n += 1;
            true
        });
        assert_eq!(n, 1);

        dev::os_dev_suspend(led, 0, false).unwrap();
        assert!(dev::os_dev_info(led).unwrap().is_suspended());
        dev::os_dev_resume(led).unwrap();
        assert!(!dev::os_dev_info(led).unwrap().is_suspended());

        // A second init starts from scratch
        os_init().unwrap();
        assert_eq!(dev::os_dev_lookup("led"), None);
        assert_eq!(os_time_ms_to_ticks(1500), 1500 * CFG_TICK_RATE_HZ / 1000);
    }
}
