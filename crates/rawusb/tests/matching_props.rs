//! Property tests for discovery filtering, endpoint selection over generated
//! descriptor trees and reference accounting

use descriptor::{
    Class, ConfigDescriptor, EndpointDescriptor, Interface, InterfaceDescriptor, TransferType,
};
use proptest::prelude::*;
use rawusb::mock::{MockBackend, MockDeviceSpec};
use rawusb::{Context, DeviceFilter};
use std::collections::BTreeSet;

/// `(bEndpointAddress, bmAttributes)`
type EndpointTree = (u8, u8);
/// Alternate setting class and endpoints
type AltTree = (Class, Vec<EndpointTree>);
/// Device class and configurations, each a list of interfaces made of alt settings
type DeviceTree = (Class, Vec<Vec<Vec<AltTree>>>);

/// Small id space so filters hit often
fn id_strategy() -> impl Strategy<Value = u16> {
    0x0001u16..=0x0004u16
}

fn filter_field() -> impl Strategy<Value = Option<u16>> {
    prop_oneof![Just(None), Just(Some(0)), id_strategy().prop_map(Some)]
}

/// Any transfer kind, usage bits included, on endpoint numbers 1..=3
fn endpoint_strategy() -> impl Strategy<Value = EndpointTree> {
    (
        any::<bool>(),
        1u8..4,
        0u8..4,
        prop::sample::select(vec![0x00u8, 0x10, 0x20]),
    )
        .prop_map(|(is_in, number, kind, usage)| {
            let address = if is_in { 0x80 | number } else { number };
            (address, kind | usage)
        })
}

fn alt_strategy() -> impl Strategy<Value = AltTree> {
    (
        prop::sample::select(vec![Class::VENDOR_SPEC, Class::HID, Class::DATA]),
        prop::collection::vec(endpoint_strategy(), 0..5),
    )
}

fn device_tree_strategy() -> impl Strategy<Value = DeviceTree> {
    let interface = prop::collection::vec(alt_strategy(), 1..3);
    let config = prop::collection::vec(interface, 0..3);
    (
        prop::sample::select(vec![Class::PER_INTERFACE, Class::HID, Class::VENDOR_SPEC]),
        prop::collection::vec(config, 0..3),
    )
}

fn build_device(index: usize, (class, configs): &DeviceTree) -> MockDeviceSpec {
    let address = index as u8 + 1;
    let mut spec =
        MockDeviceSpec::new(1, address, address, 0x1209, index as u16).with_class(*class);
    for (config_index, interfaces) in configs.iter().enumerate() {
        let mut config = ConfigDescriptor::new(config_index as u8 + 1);
        for (number, alts) in interfaces.iter().enumerate() {
            let mut interface = Interface::new(number as u8);
            for (alt_index, (alt_class, endpoints)) in alts.iter().enumerate() {
                let alt = endpoints.iter().fold(
                    InterfaceDescriptor::new(number as u8, alt_index as u8, *alt_class),
                    |alt, &(ep_address, attributes)| {
                        alt.with_endpoint(EndpointDescriptor::new(ep_address, attributes))
                    },
                );
                interface = interface.with_alt_setting(alt);
            }
            config = config.with_interface(interface);
        }
        spec = spec.with_config(config);
    }
    spec
}

/// Reader and writer addresses a raw interface should expose
///
/// Only bulk (2) and interrupt (3) endpoints count. The most recent IN and
/// OUT endpoints are used when their kinds agree, else the most recent
/// complete bulk pair, else the most recent complete interrupt pair.
fn expected_pair(endpoints: &[EndpointTree]) -> Option<(u8, u8)> {
    let kind = |attributes: u8| attributes & 0x03;
    let last = |is_in: bool, wanted: Option<u8>| {
        endpoints
            .iter()
            .rev()
            .filter(|(_, attributes)| matches!(kind(*attributes), 2 | 3))
            .find(|(address, attributes)| {
                (address & 0x80 != 0) == is_in && wanted.is_none_or(|k| kind(*attributes) == k)
            })
            .copied()
    };

    if let (Some(reader), Some(writer)) = (last(true, None), last(false, None))
        && kind(reader.1) == kind(writer.1)
    {
        return Some((reader.0, writer.0));
    }
    [2, 3].into_iter().find_map(|k| match (last(true, Some(k)), last(false, Some(k))) {
        (Some(reader), Some(writer)) => Some((reader.0, writer.0)),
        _ => None,
    })
}

/// `(device address, interface, alt setting, reader, writer)` in walk order
fn expected_matches(devices: &[DeviceTree]) -> Vec<(u8, u8, u8, u8, u8)> {
    let mut expected = Vec::new();
    for (index, (class, configs)) in devices.iter().enumerate() {
        if *class == Class::HID {
            continue;
        }
        for interfaces in configs {
            for (number, alts) in interfaces.iter().enumerate() {
                for (alt_index, (alt_class, endpoints)) in alts.iter().enumerate() {
                    if *alt_class == Class::HID {
                        continue;
                    }
                    if let Some((reader, writer)) = expected_pair(endpoints) {
                        expected.push((
                            index as u8 + 1,
                            number as u8,
                            alt_index as u8,
                            reader,
                            writer,
                        ));
                    }
                }
            }
        }
    }
    expected
}

proptest! {
    /// Property: a scan returns exactly the raw devices the filter admits
    #[test]
    fn prop_scan_matches_filter(
        ids in proptest::collection::vec((id_strategy(), id_strategy()), 0..12),
        vendor in filter_field(),
        product in filter_field(),
    ) {
        let backend = MockBackend::new();
        for (i, (vid, pid)) in ids.iter().enumerate() {
            let address = i as u8 + 1;
            backend.add_device(MockDeviceSpec::raw(1, address, address, *vid, *pid));
        }
        let context = Context::new(backend);
        let filter = DeviceFilter::new(vendor, product);

        let found = context.enumerate(filter).unwrap();
        let expected = ids.iter().filter(|(vid, pid)| filter.matches(*vid, *pid)).count();
        prop_assert_eq!(found.len(), expected);
        for record in &found {
            prop_assert!(filter.matches(record.info.vendor_id, record.info.product_id));
        }

        prop_assert_eq!(context.arena().outstanding(), expected);
        prop_assert_eq!(context.backend().total_live_refs(), expected);

        drop(found);
        prop_assert_eq!(context.arena().outstanding(), 0);
        prop_assert_eq!(context.backend().total_live_refs(), 0);
    }

    /// Property: every raw alternate setting in a generated tree is found,
    /// in walk order, with a correctly paired reader and writer
    #[test]
    fn prop_scan_walks_generated_trees(
        devices in prop::collection::vec(device_tree_strategy(), 1..4),
    ) {
        let backend = MockBackend::new();
        for (index, tree) in devices.iter().enumerate() {
            backend.add_device(build_device(index, tree));
        }
        let context = Context::new(backend);

        let found = context.enumerate(DeviceFilter::any()).unwrap();
        let actual: Vec<_> = found
            .iter()
            .map(|d| {
                (
                    d.info.address,
                    d.info.interface,
                    d.info.alternate_setting,
                    d.info.reader.address,
                    d.info.writer.address,
                )
            })
            .collect();
        let expected = expected_matches(&devices);
        prop_assert_eq!(&actual, &expected);

        for record in &found {
            let info = &record.info;
            prop_assert_ne!(info.class, Class::HID);
            prop_assert_ne!(info.interface_class, Class::HID);
            prop_assert!(info.reader.address & 0x80 != 0);
            prop_assert!(info.writer.address & 0x80 == 0);
            prop_assert_eq!(info.reader.transfer_type, info.writer.transfer_type);
            prop_assert!(matches!(
                info.reader.transfer_type,
                TransferType::Bulk | TransferType::Interrupt
            ));
        }

        let matched_devices: BTreeSet<u8> = expected.iter().map(|m| m.0).collect();
        prop_assert_eq!(context.arena().outstanding(), expected.len());
        prop_assert_eq!(context.arena().len(), matched_devices.len());
        prop_assert_eq!(context.backend().total_live_refs(), matched_devices.len());

        drop(found);
        prop_assert!(context.arena().is_empty());
        prop_assert_eq!(context.backend().total_live_refs(), 0);
    }
}
