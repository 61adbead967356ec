//! Analog to digital converter.

use stm32f1::stm32f103::ADC1;
use stm32f1xx_hal::{adc::Adc, prelude::*};

use crate::board::SensorInput;

/// Sensor input on ADC 1.
pub struct SensorAdc {
    adc: Adc<ADC1>,
    input: SensorInput,
}

impl SensorAdc {
    /// Creates the sensor converter.
    pub fn new(adc: Adc<ADC1>, input: SensorInput) -> Self {
        Self { adc, input }
    }

    /// Performs one conversion.
    pub fn convert(&mut self) -> Option<u16> {
        match self.adc.read(&mut self.input) {
            Ok(sample) => Some(sample),
            Err(_) => {
                defmt::warn!("ADC conversion failed");
                None
            }
        }
    }
}
