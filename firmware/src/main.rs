#![no_std]
#![no_main]

use core::cell::RefCell;

use critical_section::Mutex;
use esp_backtrace as _;
use esp_hal::gpio::{Event, Input, InputConfig, Io, Level, Output, OutputConfig, Pull};
use esp_hal::handler;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::ledc::channel as ledc_channel;
use esp_hal::ledc::channel::ChannelIFace;
use esp_hal::ledc::timer as ledc_timer;
use esp_hal::ledc::timer::TimerIFace;
use esp_hal::ledc::{LSGlobalClkSource, Ledc, LowSpeed};
use esp_hal::rmt::Rmt;
use esp_hal::time::{Duration, Instant, Rate};
use esp_println::println;
use portable_atomic::{AtomicBool, Ordering};
use zerocopy::IntoBytes;

use shared::fsm::{self, Config, Inputs};
use shared::hbridge::HBridge;
use shared::motion::Sequencer;
use shared::state::{HBridgeState, State};

mod analog;
mod led;
mod panel;
mod prox_sense;
mod servo;

// raw state frames for the telemetry ingester, every 50 ticks = 2 Hz
const STREAM_TICKS: u32 = 50;

// Latched from the button interrupt so a press during any part of a cycle
// lands in the next tick's input snapshot.
static EJECT_REQUESTED: AtomicBool = AtomicBool::new(false);
static EJECT_BUTTON: Mutex<RefCell<Option<Input<'static>>>> = Mutex::new(RefCell::new(None));

#[esp_hal::main]
fn main() -> ! {
    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Eject override on the board pushbutton
    let mut io = Io::new(peripherals.IO_MUX);
    io.set_interrupt_handler(eject_button_handler);
    let mut button = Input::new(peripherals.GPIO9, InputConfig::default().with_pull(Pull::Up));
    critical_section::with(|cs| {
        button.listen(Event::FallingEdge);
        EJECT_BUTTON.borrow_ref_mut(cs).replace(button);
    });

    // H-bridge gate drives, all off until a polarity is known
    let mut bridge = HBridge::new(
        Output::new(peripherals.GPIO5, Level::Low, OutputConfig::default()), // A high side
        Output::new(peripherals.GPIO6, Level::Low, OutputConfig::default()), // A low side
        Output::new(peripherals.GPIO7, Level::Low, OutputConfig::default()), // B high side
        Output::new(peripherals.GPIO20, Level::Low, OutputConfig::default()), // B low side
    );
    bridge.set(HBridgeState::Off).unwrap();

    // STAT from the charge IC, open drain, high = done or fault
    let chg_stat = Input::new(peripherals.GPIO21, InputConfig::default().with_pull(Pull::Up));

    let mut i2c = I2c::new(peripherals.I2C0, I2cConfig::default())
        .unwrap()
        .with_sda(peripherals.GPIO10)
        .with_scl(peripherals.GPIO8);
    prox_sense::init(&mut i2c);

    let mut sensors = analog::AnalogSensors::new(
        peripherals.ADC1,
        peripherals.GPIO0,
        peripherals.GPIO1,
        peripherals.GPIO4,
    );

    // Feeder servo PWM. The LEDC timer has to outlive the channel, so both
    // stay in this scope.
    let mut ledc = Ledc::new(peripherals.LEDC);
    ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);
    let mut pwm_timer = ledc.timer::<LowSpeed>(ledc_timer::Number::Timer0);
    pwm_timer
        .configure(ledc_timer::config::Config {
            duty: ledc_timer::config::Duty::Duty14Bit,
            clock_source: ledc_timer::LSClockSource::APBClk,
            frequency: Rate::from_hz(50),
        })
        .unwrap();
    let mut pwm_channel = ledc.channel::<LowSpeed>(ledc_channel::Number::Channel0, peripherals.GPIO2);
    pwm_channel
        .configure(ledc_channel::config::Config {
            timer: &pwm_timer,
            duty_pct: 0,
            pin_config: ledc_channel::config::PinConfig::PushPull,
        })
        .unwrap();
    let mut arm = Sequencer::new(servo::FeederServo::new(pwm_channel));

    let rmt = Rmt::new(peripherals.RMT, Rate::from_mhz(80)).unwrap();
    let status_led = led::StatusLed::new(led::StatusLed::configure_rmt(rmt, peripherals.GPIO3));
    let mut panel = panel::Panel::new(status_led);

    println!("feeder charger up");

    let mut s = State::default();
    let cfg = Config::default();
    let tick_period = Duration::from_millis(1_000 / fsm::TICKS_PER_SECOND as u64);

    let mut deadline = Instant::now();
    loop {
        let inputs = Inputs {
            proximity: prox_sense::proximity(&mut i2c),
            charge_done: chg_stat.is_high(),
            eject: EJECT_REQUESTED.swap(false, Ordering::Relaxed),
        };

        fsm::run(
            &mut s,
            &cfg,
            &inputs,
            &mut bridge,
            &mut arm,
            &mut sensors,
            &mut panel,
        )
        .unwrap();
        panel.show_state(s.state);

        if s.tick.is_multiple_of(STREAM_TICKS) {
            esp_println::Printer::write_bytes(s.as_bytes());
        }

        // hold the 10 ms tick
        deadline = deadline + tick_period;
        let now = Instant::now();
        if now > deadline {
            deadline = now; // overran a tick, resynchronize
        }
        while Instant::now() < deadline {}
    }
}

#[handler]
fn eject_button_handler() {
    critical_section::with(|cs| {
        if let Some(button) = EJECT_BUTTON.borrow_ref_mut(cs).as_mut() {
            if button.is_interrupt_set() {
                EJECT_REQUESTED.store(true, Ordering::Relaxed);
                button.clear_interrupt();
            }
        }
    });
}
