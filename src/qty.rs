// see [Definitions of the SI units: The binary prefixes](https://physics.nist.gov/cuu/Units/binary.html)
// see [Managing Compute Resources for Containers - Kubernetes](https://kubernetes.io/docs/concepts/configuration/manage-compute-resources-container/)
//TODO support exponent notation, see [apimachinery/quantity.go at master · kubernetes/apimachinery](https://github.com/kubernetes/apimachinery/blob/master/pkg/api/resource/quantity.go)

use std::cmp::Ordering;
use std::str::FromStr;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown scale suffix in '{0}'")]
    UnknownScale(String),

    #[error("invalid number in '{input}'")]
    InvalidNumber {
        input: String,
        source: std::num::ParseFloatError,
    },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Scale {
    label: &'static str,
    pow10: i32,
    pow2: u32,
}

static SCALES: [Scale; 16] = [
    Scale { label: "n", pow10: -9, pow2: 0 },
    Scale { label: "u", pow10: -6, pow2: 0 },
    Scale { label: "m", pow10: -3, pow2: 0 },
    Scale { label: "", pow10: 0, pow2: 0 },
    Scale { label: "k", pow10: 3, pow2: 0 },
    Scale { label: "M", pow10: 6, pow2: 0 },
    Scale { label: "G", pow10: 9, pow2: 0 },
    Scale { label: "T", pow10: 12, pow2: 0 },
    Scale { label: "P", pow10: 15, pow2: 0 },
    Scale { label: "E", pow10: 18, pow2: 0 },
    Scale { label: "Ki", pow10: 0, pow2: 10 },
    Scale { label: "Mi", pow10: 0, pow2: 20 },
    Scale { label: "Gi", pow10: 0, pow2: 30 },
    Scale { label: "Ti", pow10: 0, pow2: 40 },
    Scale { label: "Pi", pow10: 0, pow2: 50 },
    Scale { label: "Ei", pow10: 0, pow2: 60 },
];

impl Scale {
    fn factor(&self) -> f64 {
        10f64.powi(self.pow10) * 2f64.powi(self.pow2 as i32)
    }

    fn is_binary(&self) -> bool {
        self.pow2 > 0
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale {
            label: "",
            pow10: 0,
            pow2: 0,
        }
    }
}

impl FromStr for Scale {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SCALES
            .iter()
            .find(|v| v.label == s)
            .cloned()
            .ok_or_else(|| Error::UnknownScale(s.to_owned()))
    }
}

/// A kubernetes resource quantity ("250m", "8", "16Gi", "156340936n"),
/// normalized to an integer count of milli-units. The scale it was parsed
/// with is remembered for display.
#[derive(Debug, Clone, Default)]
pub struct Qty {
    value: i64,
    scale: Scale,
}

impl Qty {
    /// usage/capacity x 100; NaN when the base is absent or non-positive.
    pub fn calc_percentage(&self, base100: &Self) -> f32 {
        if self.value >= 0 && base100.value > 0 {
            self.value as f32 * 100f32 / base100.value as f32
        } else {
            f32::NAN
        }
    }

    pub fn to_milli(&self) -> f64 {
        self.value as f64
    }

    pub fn to_mib(&self) -> f64 {
        self.value as f64 / 1000.0 / (1024.0 * 1024.0)
    }

    /// Re-scale for display: the largest scale of the same family (binary
    /// vs decimal) that keeps the value >= 1.
    pub fn adjust_scale(&self) -> Qty {
        let base = self.value as f64 / 1000.0;
        let scale = SCALES
            .iter()
            .filter(|v| v.is_binary() == self.scale.is_binary())
            .filter(|v| v.factor() <= base.abs())
            .max_by(|a, b| {
                a.factor()
                    .partial_cmp(&b.factor())
                    .unwrap_or(Ordering::Equal)
            })
            .cloned()
            .unwrap_or_else(|| self.scale.clone());
        Qty {
            value: self.value,
            scale,
        }
    }
}

impl FromStr for Qty {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pos = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
            .unwrap_or(s.len());
        let (num_str, scale_str) = s.split_at(pos);
        let number = f64::from_str(num_str).map_err(|source| Error::InvalidNumber {
            input: s.to_owned(),
            source,
        })?;
        let scale = Scale::from_str(scale_str)?;
        let value = (number * scale.factor() * 1000.0).round() as i64;
        Ok(Qty { value, scale })
    }
}

impl std::fmt::Display for Qty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = self.value as f64 / (self.scale.factor() * 1000.0);
        if value == value.trunc() {
            write!(f, "{:.0}{}", value, self.scale.label)
        } else {
            write!(f, "{:.1}{}", value, self.scale.label)
        }
    }
}

impl From<&Qty> for f64 {
    fn from(v: &Qty) -> f64 {
        v.value as f64 / 1000.0
    }
}

impl PartialEq for Qty {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Qty {}

impl PartialOrd for Qty {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Qty {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl std::ops::Add for &Qty {
    type Output = Qty;
    fn add(self, other: Self) -> Qty {
        Qty {
            value: self.value + other.value,
            scale: self.scale.clone(),
        }
    }
}

impl<'b> std::ops::AddAssign<&'b Qty> for Qty {
    fn add_assign(&mut self, other: &'b Self) {
        self.value += other.value;
    }
}
