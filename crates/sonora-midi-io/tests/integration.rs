//! Integration tests for sonora-midi-io.
//!
//! These tests drive the virtual port manager against the in-memory host, so
//! no OS MIDI service is needed.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

use sonora_midi_io::{
    message_channel, BatchRequest, Channel, ChannelVoiceMsg, EndpointRef, Error, HostOperation,
    HostStatus, InMemoryHost, MidiMsg, MidiPacket, PacketList, PortDirection, UniqueId,
    VirtualPortConfig, VirtualPortManager,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type Received = Arc<Mutex<Vec<(MidiMsg, UniqueId)>>>;

fn setup() -> (Arc<InMemoryHost>, VirtualPortManager<InMemoryHost>, Received) {
    let host = Arc::new(InMemoryHost::new());
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let manager = VirtualPortManager::builder(Arc::clone(&host))
        .client_name("Sonora Test")
        .handler(move |msg: &MidiMsg, source: UniqueId| sink.lock().push((msg.clone(), source)))
        .build()
        .unwrap();
    (host, manager, received)
}

fn note_on(note: u8) -> MidiMsg {
    MidiMsg::ChannelVoice {
        channel: Channel::Ch1,
        msg: ChannelVoiceMsg::NoteOn {
            note,
            velocity: 100,
        },
    }
}

/// Counts ERROR-level events emitted while it is the active subscriber.
#[derive(Clone, Default)]
struct ErrorCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn count_errors<T>(f: impl FnOnce() -> T) -> (T, usize) {
    let counter = ErrorCounter::default();
    let subscriber = Registry::default().with(counter.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, counter.0.load(Ordering::SeqCst))
}

// ---------------------------------------------------------------------------
// 1. Single-port lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_destroy_input_is_idempotent() {
    let (_host, manager, _) = setup();
    manager
        .create_virtual_input_port(UniqueId::DEFAULT_INPUT, None)
        .unwrap();

    assert!(manager.destroy_virtual_input_port());
    assert!(!manager.destroy_virtual_input_port());
    assert_eq!(manager.virtual_input(), EndpointRef::NONE);
}

#[test]
fn test_recreate_replaces_input() {
    let (host, manager, _) = setup();

    let first = manager.create_virtual_input_port(UniqueId(5), None).unwrap();
    assert_eq!(host.endpoint_count(), 1);

    let second = manager.create_virtual_input_port(UniqueId(5), None).unwrap();
    assert_ne!(first, second);
    assert!(!host.is_live(first));
    assert!(host.is_live(second));
    assert_eq!(host.endpoint_count(), 1, "Only one virtual input at a time");
    assert_eq!(manager.virtual_input(), second);
    assert_eq!(host.unique_id_of(second), Some(UniqueId(5)));
}

#[test]
fn test_destroy_virtual_ports_with_nothing_created() {
    let (_host, manager, _) = setup();
    let ((), errors) = count_errors(|| manager.destroy_virtual_ports());
    assert_eq!(errors, 0);
    assert!(manager.virtual_input().is_none());
    assert!(manager.virtual_output().is_none());
}

#[test]
fn test_create_virtual_ports_replaces_both() {
    let (host, manager, _) = setup();
    let (in1, out1) = manager
        .create_virtual_ports(UniqueId::DEFAULT_INPUT, Some("Rig"))
        .unwrap();
    let (in2, out2) = manager
        .create_virtual_ports(UniqueId::DEFAULT_INPUT, Some("Rig"))
        .unwrap();

    assert!(!host.is_live(in1) && !host.is_live(out1));
    assert!(host.is_live(in2) && host.is_live(out2));
    assert_eq!(host.endpoint_count(), 2);
    assert_eq!(host.endpoint_name(in2).as_deref(), Some("Rig"));
    assert_eq!(host.endpoint_name(out2).as_deref(), Some("Rig"));
    assert_eq!(host.unique_id_of(out2), Some(UniqueId::DEFAULT_OUTPUT));

    manager.destroy_virtual_ports();
    assert_eq!(host.endpoint_count(), 0);
}

// ---------------------------------------------------------------------------
// 2. Failure handling
// ---------------------------------------------------------------------------

#[test]
fn test_creation_failure_is_contained() {
    let (host, manager, _) = setup();
    host.fail_next(HostOperation::CreateDestination, HostStatus::SERVER_START_ERR);

    let (result, errors) =
        count_errors(|| manager.create_virtual_input_port(UniqueId::DEFAULT_INPUT, Some("In")));

    assert_eq!(errors, 1, "Exactly one error log per host failure");
    match result {
        Err(Error::Host {
            operation,
            name,
            status,
        }) => {
            assert_eq!(operation, HostOperation::CreateDestination);
            assert_eq!(name, "In");
            assert_eq!(status, HostStatus::SERVER_START_ERR);
        }
        other => panic!("Expected host error, got {:?}", other),
    }
    assert_eq!(manager.virtual_input(), EndpointRef::NONE);
    assert_eq!(host.endpoint_count(), 0);

    // The next attempt goes through
    assert!(manager
        .create_virtual_input_port(UniqueId::DEFAULT_INPUT, Some("In"))
        .is_ok());
}

#[test]
fn test_output_creation_failure_leaves_sentinel() {
    let (host, manager, _) = setup();
    host.fail_next(HostOperation::CreateSource, HostStatus(-1));

    let (result, errors) =
        count_errors(|| manager.create_virtual_output_port(UniqueId::DEFAULT_OUTPUT, None));
    assert_eq!(errors, 1);
    assert_eq!(result.unwrap_err().host_status(), Some(HostStatus(-1)));
    assert!(manager.virtual_output().is_none());
}

#[test]
fn test_unique_id_rejection_keeps_endpoint() {
    let (host, manager, _) = setup();
    host.fail_next(HostOperation::SetUniqueId, HostStatus::ID_NOT_UNIQUE);

    let (result, errors) =
        count_errors(|| manager.create_virtual_output_port(UniqueId(77), Some("Out")));
    assert_eq!(errors, 1);
    assert!(matches!(
        result,
        Err(Error::UniqueIdRejected {
            direction: PortDirection::Output,
            unique_id: UniqueId(77),
            ..
        })
    ));

    let output = manager.virtual_output();
    assert!(output.is_some(), "Endpoint is not rolled back");
    assert!(host.is_live(output));
    assert_eq!(host.unique_id_of(output), None);
}

#[test]
fn test_dispose_failure_keeps_handle_for_retry() {
    let (host, manager, received) = setup();
    let input = manager
        .create_virtual_input_port(UniqueId::DEFAULT_INPUT, None)
        .unwrap();

    host.fail_next(HostOperation::DisposeEndpoint, HostStatus::NOT_PERMITTED);
    let (destroyed, errors) = count_errors(|| manager.destroy_virtual_input_port());
    assert!(!destroyed);
    assert_eq!(errors, 1);
    assert_eq!(manager.virtual_input(), input, "Handle stays non-sentinel");

    // The endpoint is still live and still routes messages
    host.deliver(input, &PacketList::from_message(0, &note_on(60)))
        .unwrap();
    assert_eq!(received.lock().len(), 1);

    assert!(manager.destroy_virtual_input_port());
    assert!(manager.virtual_input().is_none());
}

#[test]
fn test_stuck_input_blocks_recreation() {
    let (host, manager, _) = setup();
    let input = manager.create_virtual_input_port(UniqueId(1), None).unwrap();

    host.fail_next(HostOperation::DisposeEndpoint, HostStatus::NOT_PERMITTED);
    let result = manager.create_virtual_input_port(UniqueId(2), None);
    assert!(matches!(
        result,
        Err(Error::Host {
            operation: HostOperation::DisposeEndpoint,
            ..
        })
    ));
    assert_eq!(manager.virtual_input(), input);
    assert_eq!(host.endpoint_count(), 1);
}

// ---------------------------------------------------------------------------
// 3. Batches
// ---------------------------------------------------------------------------

#[test]
fn test_batch_auto_ids_never_collide() {
    let (host, manager, _) = setup();
    let request = BatchRequest::new().names(["One", "Two", "Three"]);

    let (inputs, outputs) = manager.create_multiple_virtual_ports(&request);
    let input_ids: Vec<i32> = inputs
        .into_iter()
        .map(|r| r.unwrap().unique_id.get())
        .collect();
    let output_ids: Vec<i32> = outputs
        .into_iter()
        .map(|r| r.unwrap().unique_id.get())
        .collect();

    assert_eq!(input_ids, vec![2_000_000, 2_000_002, 2_000_004]);
    assert_eq!(output_ids, vec![2_000_001, 2_000_003, 2_000_005]);

    let all: HashSet<i32> = input_ids.iter().chain(output_ids.iter()).copied().collect();
    assert_eq!(all.len(), 6);
    assert_eq!(host.endpoint_count(), 6);
}

#[test]
fn test_batch_pads_missing_names() {
    let (host, manager, _) = setup();
    let request = BatchRequest::new().unique_ids([10, 20, 30]).names(["Alpha"]);

    let results = manager.create_multiple_virtual_input_ports(&request);
    assert_eq!(results.len(), 3);
    let names: Vec<String> = results.into_iter().map(|r| r.unwrap().name).collect();

    assert_eq!(names[0], "Alpha");
    assert_ne!(names[1], names[2]);
    assert_ne!(names[1], "Alpha");
    assert_ne!(names[2], "Alpha");
    assert_eq!(names[1], "Sonora Test 1");
    assert_eq!(names[2], "Sonora Test 2");

    let endpoint = host.find_by_unique_id(UniqueId(30)).unwrap();
    assert_eq!(host.endpoint_name(endpoint).as_deref(), Some("Sonora Test 2"));
}

#[test]
fn test_batch_replaces_single_and_previous_batch() {
    let (host, manager, _) = setup();
    manager
        .create_virtual_output_port(UniqueId::DEFAULT_OUTPUT, None)
        .unwrap();
    manager.create_multiple_virtual_output_ports(&BatchRequest::new().names(["A", "B"]));
    assert!(manager.virtual_output().is_none());
    assert_eq!(manager.batch_outputs().len(), 2);

    manager.create_multiple_virtual_output_ports(&BatchRequest::new().names(["C"]));
    let batch = manager.batch_outputs();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].identity.name, "C");
    assert_eq!(host.endpoint_count(), 1);

    assert_eq!(manager.destroy_multiple_virtual_output_ports(), 1);
    assert_eq!(host.endpoint_count(), 0);
}

#[test]
fn test_batch_failure_affects_only_one_port() {
    let (host, manager, _) = setup();
    host.fail_next(HostOperation::CreateDestination, HostStatus::SERVER_START_ERR);

    let request = BatchRequest::new().names(["A", "B", "C"]);
    let (results, errors) = count_errors(|| manager.create_multiple_virtual_input_ports(&request));

    assert_eq!(errors, 1);
    assert!(results[0].is_err());
    assert_eq!(results[1].as_ref().unwrap().unique_id, UniqueId(2_000_002));
    assert_eq!(results[2].as_ref().unwrap().unique_id, UniqueId(2_000_004));
    assert_eq!(manager.batch_inputs().len(), 2);
}

#[test]
fn test_batch_respects_config_bases() {
    let host = Arc::new(InMemoryHost::new());
    let manager = VirtualPortManager::builder(host)
        .config(VirtualPortConfig {
            client_name: "Rig".to_string(),
            input_base_id: UniqueId(100),
            output_base_id: UniqueId(101),
            id_stride: 2,
        })
        .build()
        .unwrap();

    let results = manager.create_multiple_virtual_output_ports(&BatchRequest::new().names(["x", "y"]));
    let ids: Vec<i32> = results
        .into_iter()
        .map(|r| r.unwrap().unique_id.get())
        .collect();
    assert_eq!(ids, vec![101, 103]);
}

// ---------------------------------------------------------------------------
// 4. Packet routing
// ---------------------------------------------------------------------------

#[test]
fn test_packet_fan_out_preserves_order_and_source() {
    let (host, manager, received) = setup();
    let input = manager
        .create_virtual_input_port(UniqueId(42), None)
        .unwrap();

    let packet = PacketList::single(0, vec![0x90, 60, 100, 0x90, 62, 100, 0x90, 64, 100]);
    host.deliver(input, &packet).unwrap();

    let received = received.lock();
    assert_eq!(received.len(), 3);
    assert_eq!(received[0], (note_on(60), UniqueId(42)));
    assert_eq!(received[1], (note_on(62), UniqueId(42)));
    assert_eq!(received[2], (note_on(64), UniqueId(42)));
}

#[test]
fn test_batch_inputs_tag_their_own_ids() {
    let (host, manager, received) = setup();
    manager.create_multiple_virtual_input_ports(&BatchRequest::new().unique_ids([7, 8]));

    let mut packets = PacketList::new();
    packets.push(MidiPacket::new(0, note_on(1).to_midi()));
    host.deliver(host.find_by_unique_id(UniqueId(8)).unwrap(), &packets)
        .unwrap();
    host.deliver(host.find_by_unique_id(UniqueId(7)).unwrap(), &packets)
        .unwrap();

    let sources: Vec<UniqueId> = received.lock().iter().map(|(_, id)| *id).collect();
    assert_eq!(sources, vec![UniqueId(8), UniqueId(7)]);
}

#[test]
fn test_channel_handler_and_handler_swap() {
    let (host, manager, received) = setup();
    let input = manager
        .create_virtual_input_port(UniqueId::DEFAULT_INPUT, None)
        .unwrap();

    let (handler, inbound) = message_channel(16);
    manager.set_message_handler(handler);
    host.deliver(input, &PacketList::from_message(0, &note_on(70)))
        .unwrap();

    assert!(received.lock().is_empty(), "Old handler no longer called");
    let message = inbound.try_recv().unwrap();
    assert_eq!(message.source, UniqueId::DEFAULT_INPUT);
    assert_eq!(message.message, note_on(70));
}

#[test]
fn test_delivery_races_with_recreation() {
    let (host, manager, received) = setup();
    let manager = Arc::new(manager);
    manager.create_virtual_input_port(UniqueId(0), None).unwrap();

    let delivered = Arc::new(AtomicUsize::new(0));
    let sender = {
        let host = Arc::clone(&host);
        let manager = Arc::clone(&manager);
        let delivered = Arc::clone(&delivered);
        thread::spawn(move || {
            let packet = PacketList::from_message(0, &note_on(60));
            for _ in 0..500 {
                if host.deliver(manager.virtual_input(), &packet).is_ok() {
                    delivered.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
    };

    for id in 1..50 {
        manager.create_virtual_input_port(UniqueId(id), None).unwrap();
    }
    sender.join().unwrap();

    let received = received.lock();
    assert!(received.len() <= delivered.load(Ordering::SeqCst));
    assert!(received.iter().all(|(_, id)| (0..50).contains(&id.get())));
    assert_eq!(host.endpoint_count(), 1);
}

#[test]
fn test_echo_handler_survives_concurrent_destroy() {
    let (host, manager, _) = setup();
    let manager = Arc::new(manager);
    let (_, output) = manager
        .create_virtual_ports(UniqueId::DEFAULT_INPUT, None)
        .unwrap();
    let input = manager.virtual_input();

    let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
    let echo = Arc::downgrade(&manager);
    manager.set_message_handler(move |msg: &MidiMsg, _source: UniqueId| {
        let _ = entered_tx.try_send(());
        // Give the destroying thread time to block on this route
        thread::sleep(Duration::from_millis(100));
        if let Some(manager) = echo.upgrade() {
            assert_eq!(manager.virtual_output(), output);
            manager.send(msg).unwrap();
        }
    });

    let delivery = {
        let host = Arc::clone(&host);
        thread::spawn(move || host.deliver(input, &PacketList::from_message(0, &note_on(64))))
    };
    entered_rx.recv_timeout(Duration::from_secs(3)).unwrap();

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let destroyer = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            let _ = done_tx.send(manager.destroy_virtual_input_port());
        })
    };
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(3)), Ok(true));

    destroyer.join().unwrap();
    delivery.join().unwrap().unwrap();
    assert!(!host.is_live(input));
    assert_eq!(manager.virtual_input(), EndpointRef::NONE);

    let sent = host.sent_packets(output);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].packets[0].data, vec![0x90, 64, 100]);
}

// ---------------------------------------------------------------------------
// 5. Sending
// ---------------------------------------------------------------------------

#[test]
fn test_send_on_virtual_output() {
    let (host, manager, _) = setup();
    let output = manager
        .create_virtual_output_port(UniqueId::DEFAULT_OUTPUT, None)
        .unwrap();

    manager.send(&note_on(48)).unwrap();
    manager.send_bytes(&[0xF8]).unwrap();

    let sent = host.sent_packets(output);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].packets[0].data, vec![0x90, 48, 100]);
    assert_eq!(sent[1].packets[0].data, vec![0xF8]);
}

#[test]
fn test_send_from_batch_output() {
    let (host, manager, _) = setup();
    manager.create_multiple_virtual_output_ports(&BatchRequest::new().unique_ids([5, 6]));

    manager.send_from(UniqueId(6), &note_on(50)).unwrap();
    let endpoint = host.find_by_unique_id(UniqueId(6)).unwrap();
    assert_eq!(host.sent_packets(endpoint).len(), 1);

    assert!(matches!(
        manager.send_from(UniqueId(99), &note_on(50)),
        Err(Error::NoVirtualOutput)
    ));
}

#[test]
fn test_send_failure_reports_status() {
    let (host, manager, _) = setup();
    manager
        .create_virtual_output_port(UniqueId::DEFAULT_OUTPUT, None)
        .unwrap();
    host.fail_next(HostOperation::Send, HostStatus::MESSAGE_SEND_ERR);

    let (result, errors) = count_errors(|| manager.send(&note_on(1)));
    assert_eq!(errors, 1);
    assert_eq!(
        result.unwrap_err().host_status(),
        Some(HostStatus::MESSAGE_SEND_ERR)
    );
}
