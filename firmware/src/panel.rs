// Status panel: human-readable lines on the console plus the RGB state lamp.
// Rendering proper lives on the host side; this is only the emit path.

use esp_println::println;

use shared::fsm::{ChargeLevel, StatusPanel};
use shared::state::ChargeState;

use crate::led::{color, StatusLed};

pub struct Panel {
    led: StatusLed,
}

impl Panel {
    pub fn new(led: StatusLed) -> Self {
        Panel { led }
    }

    // lamp color tracks the machine state; called every tick, the led layer
    // drops redundant updates
    pub fn show_state(&mut self, state: ChargeState) {
        self.led.set(match state {
            ChargeState::Wakeup => color::WHITE,
            ChargeState::Idle => color::OFF,
            ChargeState::Feed => color::YELLOW,
            ChargeState::Contact => color::BLUE,
            ChargeState::Charge => color::GREEN,
            ChargeState::EndCharge => color::PURPLE,
        });
    }
}

impl StatusPanel for Panel {
    fn set_status(&mut self, text: &str) {
        println!("{}", text);
    }

    fn clear_status(&mut self) {
        // the console scrolls; there is no persistent region to blank
    }

    fn set_charge_level(&mut self, volts: f32, level: ChargeLevel) {
        let bar = match level {
            ChargeLevel::One => "[#  ]",
            ChargeLevel::Two => "[## ]",
            ChargeLevel::Three => "[###]",
            ChargeLevel::Full => "[===]",
        };
        println!("{:.2}V {}", volts, bar);
    }

    fn clear_charge_level(&mut self) {}
}
