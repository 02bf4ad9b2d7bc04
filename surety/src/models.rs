use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// Opaque identity of whoever calls into the ledger: an airline, a passenger,
/// a reporter or the administrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Principal(String);

impl From<String> for Principal {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        id.to_string().into()
    }
}

impl FromStr for Principal {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl PartialEq<&str> for Principal {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Display for Principal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Principal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Native currency in base units. One unit is [`Amount::UNIT`] base units.
///
/// Serialized as a decimal string of units (`"1.5"`), which keeps the full
/// range intact for JSON clients.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(u128);

const DECIMALS: usize = 18;

impl Amount {
    pub const ZERO: Self = Self(0);
    pub const UNIT: u128 = 1_000_000_000_000_000_000;

    pub const fn from_base(base: u128) -> Self {
        Self(base)
    }

    pub const fn units(units: u128) -> Self {
        Self(units * Self::UNIT)
    }

    pub const fn base(self) -> u128 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Multiplies by `numerator / denominator`, rounding down.
    pub fn checked_scale(self, numerator: u128, denominator: u128) -> Option<Self> {
        self.0
            .checked_mul(numerator)?
            .checked_div(denominator)
            .map(Self)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::UNIT;
        let frac = self.0 % Self::UNIT;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let frac = format!("{frac:0DECIMALS$}");
        write!(f, "{whole}.{}", frac.trim_end_matches('0'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    #[error("Invalid amount: {0:?}")]
    Invalid(String),
    #[error("Too many decimal places in {0:?} (max 18)")]
    TooPrecise(String),
    #[error("Amount out of range: {0:?}")]
    OutOfRange(String),
}

impl FromStr for Amount {
    type Err = AmountParseError;

    /// Parses a decimal number of units, e.g. `"10"` or `"1.5"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AmountParseError::Invalid(s.to_string());
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > DECIMALS {
            return Err(AmountParseError::TooPrecise(s.to_string()));
        }

        let out_of_range = || AmountParseError::OutOfRange(s.to_string());
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| out_of_range())?
        };
        let frac: u128 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<DECIMALS$}")
                .parse()
                .map_err(|_| invalid())?
        };
        whole
            .checked_mul(Self::UNIT)
            .and_then(|base| base.checked_add(frac))
            .map(Self)
            .ok_or_else(out_of_range)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}

/// Identifies a flight: the airline offering it, its code and its departure
/// time in unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlightKey {
    pub airline: Principal,
    pub code: String,
    pub departure: u64,
}

impl FlightKey {
    pub fn new(airline: impl Into<Principal>, code: impl Into<String>, departure: u64) -> Self {
        Self {
            airline: airline.into(),
            code: code.into(),
            departure,
        }
    }
}

impl Display for FlightKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.airline, self.code, self.departure)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum StatusCode {
    Unknown = 0,
    OnTime = 10,
    LateAirline = 20,
    LateWeather = 30,
    LateTechnical = 40,
    LateOther = 50,
}

impl StatusCode {
    /// Only a delay caused by the airline pays out.
    pub fn pays_out(self) -> bool {
        self == Self::LateAirline
    }
}

impl From<StatusCode> for u8 {
    fn from(code: StatusCode) -> Self {
        code as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown status code: {0}")]
pub struct UnknownStatusCode(pub u8);

impl TryFrom<u8> for StatusCode {
    type Error = UnknownStatusCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            10 => Ok(Self::OnTime),
            20 => Ok(Self::LateAirline),
            30 => Ok(Self::LateWeather),
            40 => Ok(Self::LateTechnical),
            50 => Ok(Self::LateOther),
            other => Err(UnknownStatusCode(other)),
        }
    }
}

impl FromStr for StatusCode {
    type Err = UnknownStatusCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "on-time" | "ontime" => Ok(Self::OnTime),
            "late-airline" | "lateairline" => Ok(Self::LateAirline),
            "late-weather" | "lateweather" => Ok(Self::LateWeather),
            "late-technical" | "latetechnical" => Ok(Self::LateTechnical),
            "late-other" | "lateother" => Ok(Self::LateOther),
            _ => s
                .parse::<u8>()
                .map_err(|_| UnknownStatusCode(u8::MAX))
                .and_then(Self::try_from),
        }
    }
}

/// Serializes a map with non-string keys as a list of `[key, value]` pairs so
/// it survives JSON.
pub mod entries_serde {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let entries = Vec::<(K, V)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_display_and_parse() {
        assert_eq!(Amount::units(10).to_string(), "10");
        assert_eq!(Amount::from_base(Amount::UNIT * 3 / 2).to_string(), "1.5");
        assert_eq!(Amount::from_base(1).to_string(), "0.000000000000000001");

        assert_eq!("1.5".parse::<Amount>().unwrap(), Amount::from_base(1_500_000_000_000_000_000));
        assert_eq!(".25".parse::<Amount>().unwrap(), Amount::from_base(Amount::UNIT / 4));
        assert_eq!("10".parse::<Amount>().unwrap(), Amount::units(10));
        assert!(matches!("".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!("1.2.3".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!("-1".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!(
            "0.0000000000000000001".parse::<Amount>(),
            Err(AmountParseError::TooPrecise(_))
        ));
    }

    #[test]
    fn amount_serializes_as_decimal_string() {
        let amount = Amount::from_base(Amount::UNIT * 3 / 2);
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"1.5\"");
        assert_eq!(serde_json::from_str::<Amount>("\"1.5\"").unwrap(), amount);
        assert!(serde_json::from_str::<Amount>("\"abc\"").is_err());
    }

    #[test]
    fn amount_scale_rounds_down() {
        assert_eq!(
            Amount::units(1).checked_scale(3, 2),
            Some(Amount::from_base(1_500_000_000_000_000_000))
        );
        assert_eq!(Amount::from_base(3).checked_scale(3, 2), Some(Amount::from_base(4)));
        assert_eq!(Amount::from_base(u128::MAX).checked_scale(3, 2), None);
    }

    #[test]
    fn status_code_wire_values() {
        assert_eq!(serde_json::to_string(&StatusCode::LateAirline).unwrap(), "20");
        assert_eq!(
            serde_json::from_str::<StatusCode>("40").unwrap(),
            StatusCode::LateTechnical
        );
        assert!(serde_json::from_str::<StatusCode>("15").is_err());
        assert_eq!("late-airline".parse::<StatusCode>().unwrap(), StatusCode::LateAirline);
        assert_eq!("10".parse::<StatusCode>().unwrap(), StatusCode::OnTime);
        assert!(StatusCode::LateAirline.pays_out());
        assert!(!StatusCode::LateWeather.pays_out());
    }

    #[test]
    fn flight_key_display() {
        let key = FlightKey::new("air-1", "ND1309", 1_700_000_000);
        assert_eq!(key.to_string(), "air-1/ND1309@1700000000");
    }
}
