// Analog front end on ADC1: differential cell voltage across the two
// terminal sense dividers, and the cell-bay NTC divider.

use esp_hal::analog::adc::{Adc, AdcCalCurve, AdcConfig, AdcPin, Attenuation};
use esp_hal::delay::Delay;
use esp_hal::gpio::GpioPin;
use esp_hal::peripherals::ADC1;
use esp_hal::Blocking;

use shared::fsm::{CellSense, ThermalSense};
use shared::ntc::{self, NtcConfig};

// each terminal sense divider halves the cell voltage
const SENSE_DIVIDER: f32 = 2.0;

type Cal = AdcCalCurve<ADC1>;

pub struct AnalogSensors<'a> {
    adc: Adc<'a, ADC1, Blocking>,
    // calibrated channels return millivolts
    bat_a: AdcPin<GpioPin<0>, ADC1, Cal>,
    bat_b: AdcPin<GpioPin<1>, ADC1, Cal>,
    // the NTC path wants raw counts against full scale, so no calibration
    ntc: AdcPin<GpioPin<4>, ADC1>,
    ntc_cfg: NtcConfig,
    // gap between thermistor reads; a 5 sample burst has to fit in one tick
    pub sample_gap_ms: u32,
    delay: Delay,
}

impl AnalogSensors<'static> {
    pub fn new(adc1: ADC1, bat_a: GpioPin<0>, bat_b: GpioPin<1>, ntc: GpioPin<4>) -> Self {
        let mut config = AdcConfig::new();
        let bat_a = config.enable_pin_with_cal::<_, Cal>(bat_a, Attenuation::_11dB);
        let bat_b = config.enable_pin_with_cal::<_, Cal>(bat_b, Attenuation::_11dB);
        let ntc = config.enable_pin(ntc, Attenuation::_11dB);

        AnalogSensors {
            adc: Adc::new(adc1, config),
            bat_a,
            bat_b,
            ntc,
            ntc_cfg: NtcConfig::default(),
            sample_gap_ms: 1,
            delay: Delay::new(),
        }
    }
}

impl CellSense for AnalogSensors<'_> {
    // n paired readings of the two sense lines, averaged into one signed
    // voltage. The sign says which terminal the cell's positive end touches.
    fn sample_volts(&mut self, samples: u16) -> f32 {
        let mut diff_mv: i32 = 0;
        for _ in 0..samples {
            let a = nb::block!(self.adc.read_oneshot(&mut self.bat_a)).unwrap() as i32;
            let b = nb::block!(self.adc.read_oneshot(&mut self.bat_b)).unwrap() as i32;
            diff_mv += b - a;
        }
        diff_mv as f32 * SENSE_DIVIDER / samples as f32 / 1000.0
    }
}

impl ThermalSense for AnalogSensors<'_> {
    fn sample_temp_c(&mut self, samples: u16) -> f32 {
        let mut sum: u32 = 0;
        for i in 0..samples {
            if i != 0 {
                self.delay.delay_millis(self.sample_gap_ms);
            }
            sum += nb::block!(self.adc.read_oneshot(&mut self.ntc)).unwrap() as u32;
        }
        ntc::temp_c(sum as f32 / samples as f32, &self.ntc_cfg)
    }
}
