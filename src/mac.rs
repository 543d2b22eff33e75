//! Two-stage INT8 multiply-accumulate pipeline unit
//!
//! Stage 1 registers the signed 8x8 product, stage 2 adds it into a 32-bit
//! accumulator. `clear_acc` zeroes everything on the edge it is sampled and
//! wins over `enable`.

/// Signals presented to a MAC unit for one clock edge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacDrive {
    pub input: i8,
    pub weight: i8,
    pub enable: bool,
    pub clear_acc: bool,
}

impl MacDrive {
    pub fn enabled(input: i8, weight: i8) -> Self {
        Self {
            input,
            weight,
            enable: true,
            clear_acc: false,
        }
    }

    pub fn clear() -> Self {
        Self {
            clear_acc: true,
            ..Self::default()
        }
    }
}

/// One MAC pipeline unit
#[derive(Debug, Clone, Default)]
pub struct MacUnit {
    mult_stage: i16,
    mult_valid: bool,
    acc_stage: i32,
}

impl MacUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one clock edge
    pub fn tick(&mut self, drive: MacDrive) {
        if drive.clear_acc {
            self.mult_stage = 0;
            self.mult_valid = false;
            self.acc_stage = 0;
            return;
        }

        // Both stages update from their pre-edge values.
        if self.mult_valid {
            self.acc_stage = self.acc_stage.wrapping_add(i32::from(self.mult_stage));
        }

        if drive.enable {
            // |(-128) * (-128)| = 16384 fits in i16
            self.mult_stage = i16::from(drive.input) * i16::from(drive.weight);
            self.mult_valid = true;
        } else {
            self.mult_stage = 0;
            self.mult_valid = false;
        }
    }

    pub fn accumulator(&self) -> i32 {
        self.acc_stage
    }

    pub fn product(&self) -> i16 {
        self.mult_stage
    }

    /// True while a product is waiting in stage 1
    pub fn in_flight(&self) -> bool {
        self.mult_valid
    }
}

/// Single MAC step of the golden model: `acc += input * weight`
pub fn ref_mac(input: i8, weight: i8, acc: &mut i32) {
    let product = i32::from(input) * i32::from(weight);
    *acc = acc.wrapping_add(product);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mac: &mut MacUnit) {
        mac.tick(MacDrive::default());
        mac.tick(MacDrive::default());
    }

    #[test]
    fn test_two_cycle_latency() {
        let mut mac = MacUnit::new();
        mac.tick(MacDrive::enabled(2, 3));
        assert_eq!(mac.accumulator(), 0);
        assert_eq!(mac.product(), 6);
        mac.tick(MacDrive::default());
        assert_eq!(mac.accumulator(), 6);
    }

    #[test]
    fn test_back_to_back_streaming() {
        let mut mac = MacUnit::new();
        for i in 1..=10i8 {
            mac.tick(MacDrive::enabled(i, i));
        }
        drain(&mut mac);
        assert_eq!(mac.accumulator(), 385);
    }

    #[test]
    fn test_clear_has_priority() {
        let mut mac = MacUnit::new();
        mac.tick(MacDrive::enabled(127, 127));
        drain(&mut mac);
        assert_eq!(mac.accumulator(), 16129);

        mac.tick(MacDrive {
            input: 5,
            weight: 5,
            enable: true,
            clear_acc: true,
        });
        assert_eq!(mac.accumulator(), 0);
        assert!(!mac.in_flight());
        drain(&mut mac);
        assert_eq!(mac.accumulator(), 0);
    }

    #[test]
    fn test_clear_flushes_in_flight_product() {
        let mut mac = MacUnit::new();
        mac.tick(MacDrive::enabled(-5, 7));
        mac.tick(MacDrive::clear());
        drain(&mut mac);
        assert_eq!(mac.accumulator(), 0);
    }

    #[test]
    fn test_extreme_products() {
        let cases = [
            (127i8, 127i8, 16129),
            (-128, -128, 16384),
            (127, -128, -16256),
            (1, -128, -128),
            (100, -1, -100),
        ];
        for (input, weight, expected) in cases {
            let mut mac = MacUnit::new();
            mac.tick(MacDrive::enabled(input, weight));
            drain(&mut mac);
            assert_eq!(mac.accumulator(), expected, "{} * {}", input, weight);
        }
    }

    #[test]
    fn test_accumulator_wraps() {
        let mut acc = i32::MAX;
        ref_mac(1, 1, &mut acc);
        assert_eq!(acc, i32::MIN);
    }

    #[test]
    fn test_ref_mac_accumulates() {
        let mut acc = 0;
        ref_mac(2, 3, &mut acc);
        assert_eq!(acc, 6);
        ref_mac(4, 5, &mut acc);
        assert_eq!(acc, 26);
        ref_mac(-5, 7, &mut acc);
        assert_eq!(acc, -9);
    }
}
