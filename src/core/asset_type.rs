use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Regulatory class of a tradable asset.
///
/// The class decides which risk weight applies, whether the asset counts
/// towards HQLA, and in which order it is pledged or sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetClass {
    GovBonds,
    CorporateBonds,
    Equities,
    OtherTradable,
    /// Held but never sold; valued for leverage and LCR inflows only.
    External,
}

impl AssetClass {
    pub const ALL: [AssetClass; 5] = [
        AssetClass::GovBonds,
        AssetClass::CorporateBonds,
        AssetClass::Equities,
        AssetClass::OtherTradable,
        AssetClass::External,
    ];

    fn prefix(self) -> &'static str {
        match self {
            AssetClass::GovBonds => "GOV_BONDS",
            AssetClass::CorporateBonds => "CORPORATE_BONDS",
            AssetClass::Equities => "EQUITIES",
            AssetClass::OtherTradable => "OTHERTRADABLE",
            AssetClass::External => "EXTERNAL",
        }
    }
}

/// Errors arising from parsing asset type identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetTypeError {
    #[error("unknown asset class in '{0}'")]
    UnknownClass(String),
    #[error("missing or invalid series number in '{0}'")]
    InvalidSeries(String),
}

/// A specific tradable series, e.g. `GOV_BONDS1` or `CORPORATE_BONDS2`.
///
/// Prices, haircuts and outstanding quantities are all keyed by asset type.
/// It serialises as its string form so it can key JSON maps.
///
/// # Examples
///
/// ```
/// use contagion_engine::core::asset_type::{AssetClass, AssetType};
///
/// let gov = AssetType::new(AssetClass::GovBonds, 1);
/// assert_eq!(gov.to_string(), "GOV_BONDS1");
/// assert_eq!("GOV_BONDS1".parse::<AssetType>().unwrap(), gov);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetType {
    class: AssetClass,
    series: u16,
}

impl AssetType {
    /// # Panics
    ///
    /// Panics if `series` is zero; series are numbered from 1.
    pub fn new(class: AssetClass, series: u16) -> Self {
        assert!(series > 0, "Asset series must be positive, got {}", series);
        Self { class, series }
    }

    pub fn gov_bonds(series: u16) -> Self {
        Self::new(AssetClass::GovBonds, series)
    }

    pub fn corporate_bonds(series: u16) -> Self {
        Self::new(AssetClass::CorporateBonds, series)
    }

    pub fn equities(series: u16) -> Self {
        Self::new(AssetClass::Equities, series)
    }

    pub fn other_tradable(series: u16) -> Self {
        Self::new(AssetClass::OtherTradable, series)
    }

    pub fn external(series: u16) -> Self {
        Self::new(AssetClass::External, series)
    }

    pub fn class(&self) -> AssetClass {
        self.class
    }

    pub fn series(&self) -> u16 {
        self.series
    }

    pub fn is_external(&self) -> bool {
        self.class == AssetClass::External
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class.prefix(), self.series)
    }
}

impl FromStr for AssetType {
    type Err = AssetTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let class = AssetClass::ALL
            .iter()
            .copied()
            .find(|c| s.starts_with(c.prefix()))
            .ok_or_else(|| AssetTypeError::UnknownClass(s.to_string()))?;
        let series: u16 = s[class.prefix().len()..]
            .parse()
            .map_err(|_| AssetTypeError::InvalidSeries(s.to_string()))?;
        if series == 0 {
            return Err(AssetTypeError::InvalidSeries(s.to_string()));
        }
        Ok(Self { class, series })
    }
}

impl TryFrom<String> for AssetType {
    type Error = AssetTypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AssetType> for String {
    fn from(t: AssetType) -> Self {
        t.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_asset_type_display() {
        assert_eq!(AssetType::corporate_bonds(2).to_string(), "CORPORATE_BONDS2");
        assert_eq!(AssetType::other_tradable(1).to_string(), "OTHERTRADABLE1");
        assert_eq!(AssetType::external(3).to_string(), "EXTERNAL3");
    }

    #[test]
    fn test_asset_type_parse() {
        let t: AssetType = "EQUITIES4".parse().unwrap();
        assert_eq!(t.class(), AssetClass::Equities);
        assert_eq!(t.series(), 4);
    }

    #[test]
    fn test_asset_type_parse_errors() {
        assert_eq!(
            "BITCOIN1".parse::<AssetType>(),
            Err(AssetTypeError::UnknownClass("BITCOIN1".to_string()))
        );
        assert!(matches!(
            "GOV_BONDS".parse::<AssetType>(),
            Err(AssetTypeError::InvalidSeries(_))
        ));
        assert!(matches!(
            "GOV_BONDS0".parse::<AssetType>(),
            Err(AssetTypeError::InvalidSeries(_))
        ));
    }

    #[test]
    fn test_asset_type_as_json_map_key() {
        let mut haircuts = BTreeMap::new();
        haircuts.insert(AssetType::gov_bonds(1), 0.02);
        haircuts.insert(AssetType::corporate_bonds(1), 0.04);
        let json = serde_json::to_string(&haircuts).unwrap();
        assert!(json.contains("\"GOV_BONDS1\":0.02"));
        let back: BTreeMap<AssetType, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, haircuts);
    }

    #[test]
    #[should_panic(expected = "must be positive")]
    fn test_zero_series_rejected() {
        AssetType::gov_bonds(0);
    }

    #[test]
    fn test_only_external_is_external() {
        assert!(AssetType::external(1).is_external());
        assert!(!AssetType::gov_bonds(1).is_external());
    }
}
