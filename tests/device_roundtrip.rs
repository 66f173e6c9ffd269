//! End-to-end flow against a fake device: connect, capture, locate a
//! known on-screen region, tap it, and time out waiting for an absent one.

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use droidpilot::{
    CommandOutput, CommandRunner, Controller, DriverConfig, EventBus, Result, Template,
};

/// Serves a fixed PNG screen and records every command it receives.
struct FakeDevice {
    png: Vec<u8>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl CommandRunner for FakeDevice {
    fn run(&mut self, args: &[&str], _timeout: Duration) -> Result<CommandOutput> {
        let cmd = args.join(" ");
        self.calls.lock().push(cmd.clone());
        let stdout = if cmd == "devices" {
            b"List of devices attached\n127.0.0.1:16384\tdevice\n".to_vec()
        } else if cmd.contains("exec-out screencap") {
            self.png.clone()
        } else if cmd.contains("wm size") {
            b"Physical size: 96x72".to_vec()
        } else {
            b"ok".to_vec()
        };
        Ok(CommandOutput {
            status: Some(0),
            stdout,
            stderr: Vec::new(),
        })
    }
}

fn noise_screen(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| {
        Rgb([rng.gen(), rng.gen(), rng.gen()])
    })
}

fn png_of(img: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

fn fake_controller(screen: &RgbImage) -> (Controller, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let runner = FakeDevice {
        png: png_of(screen),
        calls: Arc::clone(&calls),
    };
    let config = DriverConfig {
        device_id: Some("127.0.0.1:16384".to_string()),
        command_timeout_secs: 1,
        wait_timeout_secs: 1,
        poll_interval_ms: 50,
        task_retry_delay_secs: 0,
        ..DriverConfig::default()
    };
    let controller = Controller::with_runner(config, Box::new(runner), EventBus::new());
    (controller, calls)
}

#[test]
fn connect_capture_locate_tap_round_trip() {
    let screen = noise_screen(96, 72, 42);
    let (mut controller, calls) = fake_controller(&screen);

    let device = controller.connect().expect("connect");
    assert_eq!(device, "127.0.0.1:16384");
    assert!(controller.is_connected());

    let frame = controller.capture.capture().expect("capture");
    assert_eq!((frame.width(), frame.height()), (96, 72));

    // A crop of the live screen must be found at its source offset.
    let button = Template::from_image(
        "button",
        image::imageops::crop_imm(&screen, 40, 20, 12, 12).to_image(),
    );
    assert!(controller.tap_on_image_with(&button, 0.9));

    let tap_cmd = calls
        .lock()
        .iter()
        .rev()
        .find(|c| c.contains("input tap"))
        .cloned()
        .expect("tap dispatched");
    let coords: Vec<i64> = tap_cmd
        .rsplit(' ')
        .take(2)
        .map(|s| s.parse().expect("coordinate"))
        .collect();
    let (y, x) = (coords[0], coords[1]);
    // Template center is (46, 26); dispatch adds up to ±2 px jitter.
    assert!((x - 46).abs() <= 3, "tap x off target: {x}");
    assert!((y - 26).abs() <= 3, "tap y off target: {y}");

    controller.disconnect().expect("disconnect");
    assert!(!controller.is_connected());
}

#[test]
fn wait_for_absent_template_times_out() {
    let screen = noise_screen(96, 72, 7);
    let (mut controller, _) = fake_controller(&screen);
    controller.connect().expect("connect");

    let absent = Template::from_image("absent", noise_screen(10, 10, 1234));
    let start = Instant::now();
    assert!(!controller.wait_for(&absent));

    // Configured deadline is 1 s with a 50 ms poll; the loop must stop
    // within one poll interval past the deadline.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "overran deadline: {elapsed:?}");
}

#[test]
fn run_task_drives_the_device_through_the_controller() {
    let screen = noise_screen(96, 72, 9);
    let (mut controller, calls) = fake_controller(&screen);
    controller.connect().expect("connect");

    let badge = Template::from_image(
        "badge",
        image::imageops::crop_imm(&screen, 10, 10, 8, 8).to_image(),
    );

    let outcome = controller
        .run_task("open-badge", move |c| {
            if !c.tap_on_image_with(&badge, 0.9) {
                return Ok(false);
            }
            Ok(c.back())
        })
        .expect("task");

    assert!(outcome);
    let calls = calls.lock();
    assert!(calls.iter().any(|c| c.contains("input tap")));
    assert!(calls.iter().any(|c| c.contains("keyevent 4")));
}
