// Feeder arm servo on LEDC. Standard 50 Hz frame; the pulse width in the
// 1176..1677 us window sets the arm position. Zero duty stops the pulse
// train, which removes drive torque entirely.
//
// The LEDC timer must outlive the channel, so both live in main and only the
// configured channel is handed in here.

use esp_hal::ledc::channel::{Channel, ChannelHW};
use esp_hal::ledc::LowSpeed;

use shared::motion::ServoDrive;

const FRAME_US: u32 = 20_000; // 50 Hz
const DUTY_RANGE: u32 = 1 << 14; // 14 bit resolution

pub struct FeederServo<'a> {
    channel: Channel<'a, LowSpeed>,
}

impl<'a> FeederServo<'a> {
    pub fn new(channel: Channel<'a, LowSpeed>) -> Self {
        FeederServo { channel }
    }
}

impl ServoDrive for FeederServo<'_> {
    fn write_pulse_us(&mut self, us: u16) {
        self.channel.set_duty_hw(us as u32 * DUTY_RANGE / FRAME_US);
    }

    fn release(&mut self) {
        self.channel.set_duty_hw(0);
    }
}
