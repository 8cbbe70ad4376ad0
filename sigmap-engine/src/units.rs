//! Engineering unit normalization
//!
//! Field controllers spell the same unit many ways ("degF", "°F", "F").
//! Both the tagger and the scorer compare units through `normalize_unit`.

/// Measurement family of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFamily {
    Temperature,
    Flow,
    Pressure,
    Humidity,
}

impl UnitFamily {
    /// Semantic tag contributed by the family
    pub fn tag(&self) -> &'static str {
        match self {
            UnitFamily::Temperature => "temp",
            UnitFamily::Flow => "flow",
            UnitFamily::Pressure => "pressure",
            UnitFamily::Humidity => "humidity",
        }
    }
}

/// Canonical spelling of a unit
///
/// Unknown units come back lower-cased with whitespace and dots removed, so
/// two spellings that differ only in case or spacing still compare equal.
pub fn normalize_unit(unit: &str) -> String {
    let key: String = unit
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .collect();

    let canonical = match key.as_str() {
        "°f" | "degf" | "f" | "fahrenheit" | "°fahrenheit" | "degreesfahrenheit" => "°F",
        "°c" | "degc" | "c" | "celsius" | "°celsius" | "degreescelsius" => "°C",
        "k" | "kelvin" => "K",
        "cfm" | "ft³/min" | "ft3/min" | "cubicfeetperminute" => "cfm",
        "l/s" | "lps" | "literspersecond" => "L/s",
        "gpm" | "gal/min" => "gpm",
        "m³/h" | "m3/h" | "cmh" => "m³/h",
        "inwc" | "inw" | "\"wc" | "inh2o" | "inchesofwater" => "inWC",
        "pa" | "pascal" | "pascals" => "Pa",
        "kpa" | "kilopascal" | "kilopascals" => "kPa",
        "psi" | "psig" => "psi",
        "bar" => "bar",
        "%rh" | "rh" | "percentrh" => "%RH",
        "%" | "percent" | "pct" => "%",
        _ => return key,
    };
    canonical.to_string()
}

/// Measurement family for a unit, if it belongs to one
pub fn unit_family(unit: &str) -> Option<UnitFamily> {
    match normalize_unit(unit).as_str() {
        "°F" | "°C" | "K" => Some(UnitFamily::Temperature),
        "cfm" | "L/s" | "gpm" | "m³/h" => Some(UnitFamily::Flow),
        "inWC" | "Pa" | "kPa" | "psi" | "bar" => Some(UnitFamily::Pressure),
        "%RH" => Some(UnitFamily::Humidity),
        _ => None,
    }
}

/// Whether two optional units name the same quantity
///
/// Two absent units match; one absent unit does not.
pub fn units_match(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => normalize_unit(a) == normalize_unit(b),
        _ => false,
    }
}
