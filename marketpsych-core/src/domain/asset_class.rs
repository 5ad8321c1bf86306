use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Asset class codes published on the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetClass {
    Cmpny,
    CmpnyAmer,
    CmpnyApac,
    CmpnyEmea,
    CmpnyEsg,
    CmpnyGrp,
    ComAgr,
    ComEnm,
    Cou,
    CouEsg,
    CouMkt,
    Crypto,
    Cur,
}

impl AssetClass {
    pub const ALL: [AssetClass; 13] = [
        AssetClass::Cmpny,
        AssetClass::CmpnyAmer,
        AssetClass::CmpnyApac,
        AssetClass::CmpnyEmea,
        AssetClass::CmpnyEsg,
        AssetClass::CmpnyGrp,
        AssetClass::ComAgr,
        AssetClass::ComEnm,
        AssetClass::Cou,
        AssetClass::CouEsg,
        AssetClass::CouMkt,
        AssetClass::Crypto,
        AssetClass::Cur,
    ];

    /// Provider code, as it appears in remote paths.
    pub fn code(&self) -> &'static str {
        match self {
            AssetClass::Cmpny => "CMPNY",
            AssetClass::CmpnyAmer => "CMPNY_AMER",
            AssetClass::CmpnyApac => "CMPNY_APAC",
            AssetClass::CmpnyEmea => "CMPNY_EMEA",
            AssetClass::CmpnyEsg => "CMPNY_ESG",
            AssetClass::CmpnyGrp => "CMPNY_GRP",
            AssetClass::ComAgr => "COM_AGR",
            AssetClass::ComEnm => "COM_ENM",
            AssetClass::Cou => "COU",
            AssetClass::CouEsg => "COU_ESG",
            AssetClass::CouMkt => "COU_MKT",
            AssetClass::Crypto => "CRYPTO",
            AssetClass::Cur => "CUR",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for AssetClass {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let alias = match upper.as_str() {
            "CURRENCY" | "FX" => Some(AssetClass::Cur),
            "EQUITY" | "COMPANY" => Some(AssetClass::Cmpny),
            "COUNTRY" => Some(AssetClass::Cou),
            _ => None,
        };
        alias
            .or_else(|| AssetClass::ALL.into_iter().find(|a| a.code() == upper))
            .ok_or_else(|| ConfigError::UnknownAssetClass(s.to_string()))
    }
}
