// Beta-model conversion for the cell-bay NTC thermistor. The thermistor sits
// in a divider against a known series resistor; the firmware supplies the
// averaged raw ADC count, this module turns it into degrees Celsius.

use libm::logf;

pub struct NtcConfig {
    pub nominal_ohms: f32,
    pub nominal_temp_c: f32,
    pub beta: f32,
    pub series_ohms: f32,
    pub adc_full_scale: f32,
}

impl Default for NtcConfig {
    fn default() -> Self {
        NtcConfig {
            nominal_ohms: 10_000.0,
            nominal_temp_c: 25.0,
            beta: 3380.0, // B25 from the NTC datasheet
            series_ohms: 10_000.0,
            adc_full_scale: 4096.0,
        }
    }
}

pub fn temp_c(avg_count: f32, cfg: &NtcConfig) -> f32 {
    // divider count -> thermistor resistance
    let ohms = cfg.series_ohms / (cfg.adc_full_scale / avg_count - 1.0);

    // 1/T = ln(R/R0)/B + 1/T0
    let inv_t = logf(ohms / cfg.nominal_ohms) / cfg.beta + 1.0 / (cfg.nominal_temp_c + 273.15);
    1.0 / inv_t - 273.15
}
