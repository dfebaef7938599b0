//! Integration tests for the six literal end-to-end scenarios in §8 of the
//! design: exercising `Core` the way a real caller would, through public
//! handle values rather than dispatcher internals directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use ipc_core::config::Config;
use ipc_core::core::{deadline_from_now, Core};
use ipc_core::dispatcher::{ReadDataFlags, ReadMessageFlags, WriteDataFlags, WriteMessageFlags};
use ipc_core::options::DataPipeCreateOptions;
use ipc_core::platform::PosixPlatformSupport;
use ipc_core::Signals;
use ipc_core::Status;

mod common;

fn new_core() -> Core {
    common::init_tracing();
    Core::new(Config::default(), Arc::new(PosixPlatformSupport))
}

#[test]
fn scenario_1_message_pipe_basic() {
    let core = new_core();
    let (port0, port1) = core.create_message_pipe().unwrap();
    core.write_message(port0, Bytes::from_static(b"hello"), &[], WriteMessageFlags::NONE).unwrap();
    core.wait(port1, Signals::READABLE, Some(deadline_from_now(Duration::from_secs(1)))).unwrap();
    let (bytes, handles) = core.read_message(port1, ReadMessageFlags::NONE, None, None, None).unwrap();
    assert_eq!(&bytes[..], b"hello");
    assert!(handles.is_empty());
    assert_eq!(
        core.read_message(port1, ReadMessageFlags::NONE, None, None, None).err(),
        Some(Status::ShouldWait)
    );
}

#[test]
fn scenario_2_data_pipe_circular_wrap() {
    let core = new_core();
    let options = DataPipeCreateOptions { element_num_bytes: 1, capacity_num_bytes: 100 };
    let (producer, consumer) = core.create_data_pipe(options).unwrap();

    let first: Vec<u8> = (0..20).collect();
    assert_eq!(core.write_data(producer, &first, WriteDataFlags::NONE).unwrap(), 20);
    let mut buf = vec![0u8; 10];
    assert_eq!(core.read_data(consumer, &mut buf, ReadDataFlags::NONE).unwrap(), 10);
    assert_eq!(buf, (0..10).collect::<Vec<u8>>());

    let second: Vec<u8> = (20..110).collect();
    assert_eq!(core.write_data(producer, &second, WriteDataFlags::NONE).unwrap(), 90);
    let mut buf = vec![0u8; 100];
    assert_eq!(core.read_data(consumer, &mut buf, ReadDataFlags::NONE).unwrap(), 100);
    assert_eq!(buf, (10..110).collect::<Vec<u8>>());
}

#[test]
fn scenario_3_data_pipe_all_or_none() {
    let core = new_core();
    let options = DataPipeCreateOptions { element_num_bytes: 4, capacity_num_bytes: 40 };
    let (producer, consumer) = core.create_data_pipe(options).unwrap();

    assert_eq!(
        core.write_data(producer, &vec![0u8; 80], WriteDataFlags::ALL_OR_NONE),
        Err(Status::OutOfRange)
    );
    assert_eq!(core.read_data(consumer, &mut [], ReadDataFlags::QUERY).unwrap(), 0);
    assert_eq!(core.write_data(producer, &vec![7u8; 20], WriteDataFlags::NONE).unwrap(), 20);
    assert_eq!(
        core.write_data(producer, &vec![0u8; 24], WriteDataFlags::ALL_OR_NONE),
        Err(Status::OutOfRange)
    );
    assert_eq!(
        core.read_data(consumer, &mut vec![0u8; 40], ReadDataFlags::ALL_OR_NONE),
        Err(Status::OutOfRange)
    );
}

#[test]
fn scenario_4_data_pipe_two_phase_then_close() {
    let core = new_core();
    let options = DataPipeCreateOptions { element_num_bytes: 1, capacity_num_bytes: 16 };
    let (producer, consumer) = core.create_data_pipe(options).unwrap();

    let mapping = core.begin_write_data(producer, 0).unwrap();
    assert!(mapping.len() >= 1);
    drop(mapping);

    core.close(consumer).unwrap();
    assert_eq!(core.end_write_data(producer, 0), Ok(()));
    assert_eq!(core.write_data(producer, &[1], WriteDataFlags::NONE), Err(Status::FailedPrecondition));
}

#[test]
fn scenario_5_handle_transfer() {
    let core = new_core();
    let options = DataPipeCreateOptions { element_num_bytes: 1, capacity_num_bytes: 16 };
    let (producer, consumer) = core.create_data_pipe(options).unwrap();
    core.write_data(producer, b"buffered", WriteDataFlags::NONE).unwrap();

    let (mp0, mp1) = core.create_message_pipe().unwrap();
    core.write_message(mp0, Bytes::from_static(b"here's a consumer"), &[consumer], WriteMessageFlags::NONE).unwrap();

    assert_eq!(core.close(consumer).err(), Some(Status::InvalidArgument));

    let (_bytes, handles) = core.read_message(mp1, ReadMessageFlags::NONE, None, None, None).unwrap();
    assert_eq!(handles.len(), 1);
    let new_consumer = handles[0];
    let mut buf = vec![0u8; 8];
    assert_eq!(core.read_data(new_consumer, &mut buf, ReadDataFlags::NONE).unwrap(), 8);
    assert_eq!(&buf, b"buffered");
}

#[test]
fn scenario_7_read_message_buffer_too_small() {
    let core = new_core();
    let (port0, port1) = core.create_message_pipe().unwrap();
    core.write_message(port0, Bytes::from_static(b"hello world"), &[], WriteMessageFlags::NONE).unwrap();

    use ipc_core::dispatcher::RequiredSizes;
    let mut sizes = RequiredSizes::default();
    let err = core.read_message(port1, ReadMessageFlags::NONE, Some(4), None, Some(&mut sizes));
    assert_eq!(err.err(), Some(Status::ResourceExhausted));
    assert_eq!(sizes.num_bytes, 11);
    assert_eq!(sizes.num_handles, 0);

    // Message stays queued without MAY_DISCARD; a big-enough buffer reads it.
    let (bytes, _) = core.read_message(port1, ReadMessageFlags::NONE, None, None, None).unwrap();
    assert_eq!(&bytes[..], b"hello world");
}

#[test]
fn scenario_6_wait_many() {
    let core = new_core();
    let (a0, a1) = core.create_message_pipe().unwrap();
    let (_b0, b1) = core.create_message_pipe().unwrap();

    core.write_message(a0, Bytes::from_static(b"x"), &[], WriteMessageFlags::NONE).unwrap();
    let result = core
        .wait_many(&[a1, b1], &[Signals::READABLE, Signals::READABLE], Some(deadline_from_now(Duration::from_secs(1))))
        .unwrap();
    assert_eq!(result.index, 0);

    // A non-blocking (already-elapsed) deadline on an already-satisfied
    // handle must still succeed immediately rather than report a timeout.
    let immediate = core.wait_many(&[a1], &[Signals::READABLE], Some(Instant::now()));
    assert!(immediate.is_ok());
}
