//! The invoice shape every extraction is normalised into.
//!
//! Downstream comparison logic keys on field presence, so every field is
//! always serialized: missing scalars become `null`, missing nested objects
//! become objects of `null`s, missing lists become `null`.
//!
//! Models do not agree on key spelling (`CountryOfOrigin`,
//! `country_of_origin`, `Country of Origin`) or on scalar types (an HS code
//! may come back as a JSON number). [`StructuredInvoice::from_value`] accepts
//! all of these; it never invents values that are not in the reply.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredInvoice {
    #[serde(rename = "Parties")]
    pub parties: Option<Vec<Party>>,
    #[serde(rename = "CountryOverview")]
    pub country_overview: CountryOverview,
    #[serde(rename = "CommodityDetails")]
    pub commodity_details: Option<Vec<Commodity>>,
    #[serde(rename = "Transportation")]
    pub transportation: Transportation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Party {
    #[serde(rename = "PartyName")]
    pub party_name: Option<String>,
    #[serde(rename = "Role")]
    pub role: Option<String>,
    #[serde(rename = "Location")]
    pub location: Location,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    #[serde(rename = "City")]
    pub city: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountryOverview {
    #[serde(rename = "CountryOfOrigin")]
    pub country_of_origin: Option<String>,
    #[serde(rename = "CountryOfDestination")]
    pub country_of_destination: Option<String>,
    #[serde(rename = "TransitCountry")]
    pub transit_country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commodity {
    #[serde(rename = "DescriptionOfGoods")]
    pub description_of_goods: Option<String>,
    #[serde(rename = "HSCode")]
    pub hs_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transportation {
    #[serde(rename = "MeansOfTransport")]
    pub means_of_transport: Option<String>,
    #[serde(rename = "VesselNumber")]
    pub vessel_number: Option<String>,
}

impl StructuredInvoice {
    /// Convert a normalized model reply into the canonical shape.
    ///
    /// Fails only when the top level is not a JSON object.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| format!("expected an object, got {}", kind(value)))?;

        Ok(Self {
            parties: list(obj, &["Parties", "Party"], Party::from_value),
            country_overview: CountryOverview::from_object(
                object(obj, &["CountryOverview", "Countries", "Country"]),
            ),
            commodity_details: list(
                obj,
                &["CommodityDetails", "Commodities", "Commodity", "Goods"],
                Commodity::from_value,
            ),
            transportation: Transportation::from_object(
                object(obj, &["Transportation", "Transport"]),
            ),
        })
    }
}

impl Party {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(obj) => Some(Self {
                party_name: scalar(obj, &["PartyName", "Name"]),
                role: scalar(obj, &["Role", "PartyRole", "Type"]),
                location: Location::from_object(object(obj, &["Location", "Address"])),
            }),
            Value::String(name) => Some(Self {
                party_name: Some(name.clone()),
                ..Default::default()
            }),
            _ => None,
        }
    }
}

impl Location {
    fn from_object(obj: Option<&Map<String, Value>>) -> Self {
        let Some(obj) = obj else {
            return Self::default();
        };
        Self {
            city: scalar(obj, &["City", "Town"]),
            country: scalar(obj, &["Country"]),
        }
    }
}

impl CountryOverview {
    fn from_object(obj: Option<&Map<String, Value>>) -> Self {
        let Some(obj) = obj else {
            return Self::default();
        };
        Self {
            country_of_origin: scalar(obj, &["CountryOfOrigin", "Origin", "OriginCountry"]),
            country_of_destination: scalar(
                obj,
                &["CountryOfDestination", "Destination", "DestinationCountry"],
            ),
            transit_country: scalar(obj, &["TransitCountry", "Transit", "CountryOfTransit"]),
        }
    }
}

impl Commodity {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            description_of_goods: scalar(
                obj,
                &["DescriptionOfGoods", "Description", "GoodsDescription"],
            ),
            hs_code: scalar(obj, &["HSCode", "HSC", "HarmonizedCode", "HarmonisedCode"]),
        })
    }
}

impl Transportation {
    fn from_object(obj: Option<&Map<String, Value>>) -> Self {
        let Some(obj) = obj else {
            return Self::default();
        };
        Self {
            means_of_transport: scalar(
                obj,
                &["MeansOfTransport", "ModeOfTransport", "TransportMode"],
            ),
            vessel_number: scalar(obj, &["VesselNumber", "VesselNo", "Vessel", "VesselName"]),
        }
    }
}

// ── Lenient lookup helpers ───────────────────────────────────────────────────

/// Lower-cased key with everything but letters and digits removed.
fn canonical(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// First value whose key matches any of `names`, in `names` order.
fn lookup<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| {
        let wanted = canonical(name);
        obj.iter()
            .find(|(k, _)| canonical(k) == wanted)
            .map(|(_, v)| v)
    })
}

fn object<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Map<String, Value>> {
    lookup(obj, names).and_then(Value::as_object)
}

fn scalar(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    lookup(obj, names).and_then(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        Value::Object(_) => None,
    }
}

/// A list field; a lone object is treated as a one-element list.
fn list<T>(
    obj: &Map<String, Value>,
    names: &[&str],
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<Vec<T>> {
    let value = lookup(obj, names)?;
    match value {
        Value::Array(items) => Some(items.iter().filter_map(|item| convert(item)).collect()),
        Value::Object(_) => convert(value).map(|item| vec![item]),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
