//! Integration tests for opening, closing and shutting down
//!
//! Tests the handle lifecycle against the mock backend, including:
//! - Re-resolving a device by port and interface
//! - Cleanup after each failing open step
//! - Idempotent close and release failures
//! - Context teardown ordering

use rawusb::mock::{MockBackend, MockDeviceSpec};
use rawusb::{Context, DeviceFilter, DeviceKey, Error};
use std::time::Duration;

fn key(address: u8) -> DeviceKey {
    DeviceKey {
        bus_number: 1,
        address,
    }
}

/// Two identical devices on different ports
fn twin_context() -> Context<MockBackend> {
    let backend = MockBackend::new();
    backend.add_device(MockDeviceSpec::raw(1, 1, 1, 0x1209, 0x0001));
    backend.add_device(MockDeviceSpec::raw(1, 2, 5, 0x1209, 0x0001));
    Context::new(backend)
}

mod open {
    use super::*;

    #[test]
    fn test_open_resolves_by_port() {
        let context = twin_context();
        let found = context.enumerate(DeviceFilter::any()).unwrap();
        let second = found.iter().find(|d| d.info.port == 5).unwrap();

        let handle = context.open(&second.info).unwrap();
        assert_eq!(handle.info().port, 5);
        assert_eq!(handle.info().address, 2);
        assert!(context.backend().is_claimed(key(2), 0));
        assert!(!context.backend().is_claimed(key(1), 0));
        assert_eq!(context.open_handles(), 1);

        // Records from the listing plus the handle's own reference
        assert_eq!(context.arena().refs(key(2)), 2);
        assert_eq!(context.arena().refs(key(1)), 1);
    }

    #[test]
    fn test_open_without_prior_scan_record() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();
        assert_eq!(context.arena().outstanding(), 0);

        let handle = context.open(&info).unwrap();
        assert_eq!(context.arena().outstanding(), 1);

        drop(handle);
        assert_eq!(context.arena().outstanding(), 0);
        assert_eq!(context.backend().total_live_refs(), 0);
    }

    #[test]
    fn test_open_unplugged_device() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[1].info.clone();
        context.backend().remove_device(key(2));

        let err = context.open(&info).unwrap_err();
        assert!(matches!(err, Error::NotFound { port: 5, .. }));
        assert_eq!(context.backend().open_calls(), 0);
        assert_eq!(context.backend().total_live_refs(), 0);
    }

    #[test]
    fn test_native_open_failure() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();
        context.backend().fail_open(key(1), rusb::Error::Access);

        let err = context.open(&info).unwrap_err();
        assert!(matches!(err, Error::Open(rusb::Error::Access)));
        assert_eq!(context.open_handles(), 0);
        assert_eq!(context.arena().outstanding(), 0);
        assert_eq!(context.backend().total_live_refs(), 0);
    }

    #[test]
    fn test_claim_failure_closes_native_handle() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();
        context.backend().fail_claim(key(1), rusb::Error::Busy);

        let err = context.open(&info).unwrap_err();
        assert!(matches!(
            err,
            Error::Claim {
                interface: 0,
                source: rusb::Error::Busy
            }
        ));
        assert_eq!(context.backend().open_calls(), 1);
        assert_eq!(context.backend().open_native_handles(), 0);
        assert_eq!(context.arena().outstanding(), 0);
    }

    #[test]
    fn test_auto_detach_unsupported_is_tolerated() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();
        context
            .backend()
            .fail_auto_detach(Some(rusb::Error::NotSupported));

        let handle = context.open(&info).unwrap();
        assert!(!handle.is_closed());
    }

    #[test]
    fn test_auto_detach_failure_aborts_open() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();
        context.backend().fail_auto_detach(Some(rusb::Error::Access));

        let err = context.open(&info).unwrap_err();
        assert!(matches!(err, Error::AutoDetach(rusb::Error::Access)));
        assert_eq!(context.backend().claim_calls(), 0);
        assert_eq!(context.backend().open_native_handles(), 0);
    }

    #[test]
    fn test_detach_without_kernel_driver_is_tolerated() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();

        context.backend().fail_detach(Some(rusb::Error::NotFound));
        context.open(&info).unwrap().close().unwrap();

        context.backend().fail_detach(Some(rusb::Error::NotSupported));
        context.open(&info).unwrap().close().unwrap();

        assert_eq!(context.backend().detach_calls(), 2);
    }

    #[test]
    fn test_detach_failure_aborts_open() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();
        context.backend().fail_detach(Some(rusb::Error::Access));

        let err = context.open(&info).unwrap_err();
        assert!(matches!(err, Error::Detach { interface: 0, .. }));
        assert_eq!(context.backend().open_native_handles(), 0);
        assert_eq!(context.open_handles(), 0);
    }
}

mod close {
    use super::*;

    #[test]
    fn test_close_releases_interface() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();
        let handle = context.open(&info).unwrap();

        handle.close().unwrap();
        assert!(!context.backend().is_claimed(key(1), 0));
        assert_eq!(context.backend().open_native_handles(), 0);
        assert_eq!(context.arena().outstanding(), 0);

        handle.close().unwrap();
        assert_eq!(context.backend().release_calls(), 1);
        assert_eq!(context.backend().close_calls(), 1);
    }

    #[test]
    fn test_release_failure_still_closes() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();
        let handle = context.open(&info).unwrap();
        context.backend().fail_release(Some(rusb::Error::NoDevice));

        let err = handle.close().unwrap_err();
        assert!(matches!(
            err,
            Error::Release {
                interface: 0,
                source: rusb::Error::NoDevice
            }
        ));
        assert!(handle.is_closed());
        assert_eq!(context.open_handles(), 0);
        assert_eq!(context.backend().open_native_handles(), 0);
        assert_eq!(context.arena().outstanding(), 0);

        // Already closed: nothing left to fail
        handle.close().unwrap();
    }

    #[test]
    fn test_reopen_after_close() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();

        for _ in 0..3 {
            let handle = context.open(&info).unwrap();
            handle.close().unwrap();
        }
        assert_eq!(context.backend().open_calls(), 3);
        assert_eq!(context.backend().open_native_handles(), 0);
    }
}

mod shutdown {
    use super::*;

    #[test]
    fn test_shutdown_waits_for_handles() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();
        let handle = context.open(&info).unwrap();

        std::thread::scope(|s| {
            s.spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                drop(handle);
            });

            context.shutdown();
            assert_eq!(context.open_handles(), 0);
            assert_eq!(context.backend().open_native_handles(), 0);
        });

        assert_eq!(context.backend().teardown_calls(), 1);
    }

    #[test]
    fn test_shutdown_timeout_with_open_handle() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();
        let handle = context.open(&info).unwrap();

        let err = context
            .shutdown_timeout(Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, Error::HandlesOutstanding(1)));
        assert_eq!(context.backend().teardown_calls(), 0);
        assert!(context.is_shutting_down());

        // The handle stays usable until closed
        handle.write(&[1, 2, 3]).unwrap();

        handle.close().unwrap();
        context.shutdown_timeout(Duration::from_millis(20)).unwrap();
        assert_eq!(context.backend().teardown_calls(), 1);
    }

    #[test]
    fn test_new_work_refused_after_shutdown() {
        let context = twin_context();
        let info = context.enumerate(DeviceFilter::any()).unwrap()[0].info.clone();
        context.shutdown();

        assert!(matches!(
            context.enumerate(DeviceFilter::any()),
            Err(Error::ShuttingDown)
        ));
        assert!(matches!(context.open(&info), Err(Error::ShuttingDown)));
    }

    #[test]
    fn test_shutdown_before_init_skips_teardown() {
        let context = twin_context();
        context.shutdown();
        assert_eq!(context.backend().init_calls(), 0);
        assert_eq!(context.backend().teardown_calls(), 0);
    }
}
