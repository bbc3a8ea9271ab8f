use serde::{Deserialize, Serialize};

pub type CountryCode = i32;

/// A country accounts are registered in. The code is assigned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub code: CountryCode,
    pub name: Option<String>,
    pub continent_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryUpdate {
    pub name: Option<String>,
    pub continent_name: Option<String>,
}

impl CountryUpdate {
    pub(crate) fn apply_to(self, country: &mut Country) {
        if let Some(name) = self.name {
            country.name = Some(name);
        }
        if let Some(continent_name) = self.continent_name {
            country.continent_name = Some(continent_name);
        }
    }
}
