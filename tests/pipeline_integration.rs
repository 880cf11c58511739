// End-to-end tests for the Pipeline boundary
//
// Frames are either submitted directly (link disabled) or streamed through a
// scripted transport, and the consumer side is checked for rate limiting,
// ordering and buffer bounds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use sensory_pipeline::codec::{monotonic_seconds, RawTelemetry};
use sensory_pipeline::config::AppConfig;
use sensory_pipeline::link::{LinkState, ScriptedTransport};
use sensory_pipeline::{Pipeline, PipelineError};

fn offline_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.link.enabled = false;
    config.engine.raw_capacity = 200;
    config.engine.feature_capacity = 100;
    config
}

fn jittered_frame(rng: &mut impl Rng, beat: bool) -> RawTelemetry {
    RawTelemetry {
        amplitude: rng.gen_range(0.05..0.9),
        dominant_frequency: rng.gen_range(80.0..1200.0),
        bass_level: rng.gen_range(0.0..0.8),
        mid_level: rng.gen_range(0.0..0.5),
        treble_level: rng.gen_range(0.0..0.3),
        beat_flag: beat,
        timestamp: monotonic_seconds(),
    }
}

/// Submit frames at roughly `rate_hz` for `duration`
fn feed(pipeline: &Pipeline, rate_hz: f64, duration: Duration) -> usize {
    let mut rng = rand::thread_rng();
    let period = Duration::from_secs_f64(1.0 / rate_hz);
    let started = Instant::now();
    let mut sent = 0usize;
    while started.elapsed() < duration {
        pipeline.submit(jittered_frame(&mut rng, sent % 50 == 0));
        sent += 1;
        thread::sleep(period);
    }
    sent
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn test_engine_rate_is_capped_under_fast_feed() {
    let pipeline = Pipeline::new(offline_config());
    let started = Instant::now();
    pipeline.start().unwrap();
    let sent = feed(&pipeline, 200.0, Duration::from_millis(600));
    pipeline.stop();
    let elapsed = started.elapsed().as_secs_f64();

    let stats = pipeline.statistics();
    assert!(sent > 50);
    assert!(stats.samples_processed > 0);
    let ceiling = (elapsed * 100.0).ceil() as u64 + 2;
    assert!(
        stats.samples_processed <= ceiling,
        "{} snapshots in {:.3}s exceeds ceiling {}",
        stats.samples_processed,
        elapsed,
        ceiling
    );
    assert!(stats.buffer_fill_ratio > 0.0 && stats.buffer_fill_ratio <= 1.0);
    assert!(stats.raw_fill_ratio <= 1.0);
    assert!(!stats.running);
    assert!(stats.link.is_none());
}

#[test]
fn test_snapshots_are_bounded_and_ordered() {
    let pipeline = Pipeline::new(offline_config());
    pipeline.start().unwrap();
    feed(&pipeline, 200.0, Duration::from_millis(2000));
    pipeline.stop();

    // More cycles ran than the feature buffer holds
    let recent = pipeline.recent_snapshots(1000);
    assert_eq!(recent.len(), 100);
    assert!(recent
        .windows(2)
        .all(|pair| pair[0].timestamp() <= pair[1].timestamp()));
    assert_eq!(pipeline.latest_snapshot(), recent.last().cloned());

    let tail = pipeline.recent_snapshots(5);
    assert_eq!(tail.as_slice(), &recent[95..]);
    assert!(pipeline.recent_snapshots(0).is_empty());
}

#[test]
fn test_concurrent_readers_see_consistent_snapshots() {
    let pipeline = Arc::new(Pipeline::new(offline_config()));
    pipeline.start().unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut checks = 0usize;
                while !done.load(Ordering::Relaxed) {
                    let recent = pipeline.recent_snapshots(20);
                    assert!(recent.len() <= 20);
                    assert!(recent
                        .windows(2)
                        .all(|pair| pair[0].timestamp() <= pair[1].timestamp()));
                    let stats = pipeline.statistics();
                    assert!(stats.buffer_fill_ratio <= 1.0);
                    checks += 1;
                    thread::sleep(Duration::from_millis(1));
                }
                checks
            })
        })
        .collect();

    feed(&pipeline, 200.0, Duration::from_millis(400));
    done.store(true, Ordering::Relaxed);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    pipeline.stop();
}

#[test]
fn test_start_stop_lifecycle() {
    let pipeline = Pipeline::new(offline_config());
    pipeline.start().unwrap();
    assert!(pipeline.statistics().running);
    assert_eq!(pipeline.start(), Err(PipelineError::AlreadyRunning));

    pipeline.stop();
    pipeline.stop();
    assert!(!pipeline.is_running());

    // Frames submitted while stopped are buffered but not processed
    let before = pipeline.statistics().samples_processed;
    let mut rng = rand::thread_rng();
    pipeline.submit(jittered_frame(&mut rng, false));
    pipeline.submit(jittered_frame(&mut rng, false));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(pipeline.statistics().samples_processed, before);
}

#[test]
fn test_subscribers_receive_snapshots() {
    let pipeline = Pipeline::new(offline_config());
    let mut rx = pipeline.subscribe();
    pipeline.start().unwrap();
    feed(&pipeline, 200.0, Duration::from_millis(200));
    pipeline.stop();

    let mut received = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        received.push(snapshot);
    }
    assert!(!received.is_empty());
    assert!(received
        .windows(2)
        .all(|pair| pair[0].timestamp() <= pair[1].timestamp()));
}

#[test]
fn test_serial_feed_with_control_publisher() {
    let mut config = AppConfig::default();
    config.link.settle_delay_ms = 0;
    config.link.self_test_window_ms = 1000;
    config.link.self_test_poll_ms = 1;
    config.link.idle_poll_ms = 1;
    config.control.enabled = true;
    config.control.rhythm_interval_ms = 100;

    let (transport, handle) = ScriptedTransport::pair();
    let stop_feed = Arc::new(AtomicBool::new(false));
    let feeder = {
        let handle = handle.clone();
        let stop_feed = Arc::clone(&stop_feed);
        thread::spawn(move || {
            let mut i = 0u32;
            while !stop_feed.load(Ordering::Relaxed) {
                let beat = u8::from(i % 25 == 0);
                handle.push_line(format!(
                    "AMP:{},FREQ:220,BASS:400,MID:200,TREBLE:50,BEAT:{}",
                    300 + (i % 7) * 40,
                    beat
                ));
                i += 1;
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    let pipeline = Pipeline::new(config);
    pipeline
        .start_with_transport("scripted", Box::new(transport))
        .unwrap();
    assert_eq!(pipeline.link_state(), Some(LinkState::Reading));

    thread::sleep(Duration::from_millis(500));
    pipeline.stop();
    stop_feed.store(true, Ordering::Relaxed);
    feeder.join().unwrap();

    let stats = pipeline.statistics();
    assert!(stats.samples_processed > 0);
    let link = stats.link.expect("link statistics after serial start");
    assert!(link.packets_received > 0);
    assert_eq!(link.parse_errors, 0);
    assert_eq!(link.port_name.as_deref(), Some("scripted"));

    let snapshot = pipeline.latest_snapshot().unwrap();
    assert_eq!(snapshot.raw.dominant_frequency, 220.0);

    let written = handle.written();
    assert!(written.lines().any(|l| l.starts_with("RHYTHM:")));
    assert!(written.lines().any(|l| l.starts_with("WAVE:")));
    assert!(written.lines().any(|l| l.starts_with("SPECTRUM:")));
    assert_eq!(pipeline.link_state(), None);
}

#[test]
fn test_lost_link_stops_reporting_running() {
    let mut config = AppConfig::default();
    config.link.settle_delay_ms = 0;
    config.link.self_test_window_ms = 1000;
    config.link.self_test_poll_ms = 1;
    config.link.idle_poll_ms = 1;
    config.link.max_consecutive_errors = 3;
    config.link.error_backoff_ms = 1;

    let (transport, handle) = ScriptedTransport::pair();
    let stop_feed = Arc::new(AtomicBool::new(false));
    let feeder = {
        let handle = handle.clone();
        let stop_feed = Arc::clone(&stop_feed);
        thread::spawn(move || {
            while !stop_feed.load(Ordering::Relaxed) {
                handle.push_line("AMP:400,FREQ:330,BASS:300,MID:200,TREBLE:80,BEAT:0");
                thread::sleep(Duration::from_millis(5));
            }
        })
    };

    let pipeline = Pipeline::new(config);
    pipeline
        .start_with_transport("scripted", Box::new(transport))
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        pipeline.statistics().samples_processed > 0
    }));
    assert!(!pipeline.link_failed());

    // Cable pulled
    handle.set_failing(true);
    assert!(wait_until(Duration::from_secs(2), || !pipeline.is_running()));

    let stats = pipeline.statistics();
    assert!(!stats.running);
    assert!(stats.link_failed);
    assert_eq!(stats.link_state, Some(LinkState::Disconnected));
    assert_eq!(stats.link.as_ref().map(|l| l.transport_errors), Some(3));

    // No snapshots of the last frame keep arriving after the loss
    thread::sleep(Duration::from_millis(50));
    let settled = pipeline.statistics().samples_processed;
    thread::sleep(Duration::from_millis(150));
    assert_eq!(pipeline.statistics().samples_processed, settled);

    pipeline.stop();
    stop_feed.store(true, Ordering::Relaxed);
    feeder.join().unwrap();

    let stopped = pipeline.statistics();
    assert!(!stopped.link_failed);
    assert_eq!(stopped.link_state, None);
    assert!(stopped.link.is_some());
}
