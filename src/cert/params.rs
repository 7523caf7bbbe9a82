use std::fmt;

use const_oid::ObjectIdentifier;
use der::{Tag, Tagged};
use der::asn1::{Any, PrintableStringRef, SetOfVec};
use time::{Duration, OffsetDateTime};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use crate::error::{CaError, Result};

const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const OID_STATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const OID_ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_ORGANIZATION_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

/// Attribute types recognised in a distinguished name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Country,
    State,
    Locality,
    Organization,
    OrganizationUnit,
    CommonName,
    /// Any other attribute, kept by OID so foreign names compare exactly.
    Other(ObjectIdentifier),
}

impl AttributeType {
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            AttributeType::Country => OID_COUNTRY,
            AttributeType::State => OID_STATE,
            AttributeType::Locality => OID_LOCALITY,
            AttributeType::Organization => OID_ORGANIZATION,
            AttributeType::OrganizationUnit => OID_ORGANIZATION_UNIT,
            AttributeType::CommonName => OID_COMMON_NAME,
            AttributeType::Other(oid) => *oid,
        }
    }

    pub fn from_oid(oid: ObjectIdentifier) -> Self {
        match oid {
            OID_COUNTRY => AttributeType::Country,
            OID_STATE => AttributeType::State,
            OID_LOCALITY => AttributeType::Locality,
            OID_ORGANIZATION => AttributeType::Organization,
            OID_ORGANIZATION_UNIT => AttributeType::OrganizationUnit,
            OID_COMMON_NAME => AttributeType::CommonName,
            other => AttributeType::Other(other),
        }
    }

    fn short_name(&self) -> String {
        match self {
            AttributeType::Country => "C".to_string(),
            AttributeType::State => "ST".to_string(),
            AttributeType::Locality => "L".to_string(),
            AttributeType::Organization => "O".to_string(),
            AttributeType::OrganizationUnit => "OU".to_string(),
            AttributeType::CommonName => "CN".to_string(),
            AttributeType::Other(oid) => oid.to_string(),
        }
    }
}

/// An ordered distinguished name, used for both subject and issuer.
///
/// Equality is structural: the same attributes with the same values in the
/// same order. A non-empty common name is required before the name can be
/// encoded into a certificate or request.
///
/// ```
/// use certkit_ca::cert::params::DistinguishedName;
///
/// let name = DistinguishedName::new()
///     .country("MD")
///     .organization("MyPKI")
///     .common_name("MyPKI Root CA");
/// assert_eq!(name.to_string(), "C=MD, O=MyPKI, CN=MyPKI Root CA");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DistinguishedName {
    attributes: Vec<(AttributeType, String)>,
}

impl DistinguishedName {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute, keeping insertion order.
    pub fn with(mut self, attribute: AttributeType, value: impl Into<String>) -> Self {
        self.attributes.push((attribute, value.into()));
        self
    }

    pub fn common_name(self, value: impl Into<String>) -> Self {
        self.with(AttributeType::CommonName, value)
    }

    pub fn country(self, value: impl Into<String>) -> Self {
        self.with(AttributeType::Country, value)
    }

    pub fn state(self, value: impl Into<String>) -> Self {
        self.with(AttributeType::State, value)
    }

    pub fn locality(self, value: impl Into<String>) -> Self {
        self.with(AttributeType::Locality, value)
    }

    pub fn organization(self, value: impl Into<String>) -> Self {
        self.with(AttributeType::Organization, value)
    }

    pub fn organization_unit(self, value: impl Into<String>) -> Self {
        self.with(AttributeType::OrganizationUnit, value)
    }

    pub fn attributes(&self) -> &[(AttributeType, String)] {
        &self.attributes
    }

    /// First value of the given attribute type.
    pub fn get(&self, attribute: AttributeType) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(kind, _)| *kind == attribute)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_common_name(&self) -> Option<&str> {
        self.get(AttributeType::CommonName)
    }

    /// Checks the invariants every encodable name must satisfy.
    pub fn validate(&self) -> Result<()> {
        match self.get_common_name() {
            Some(cn) if !cn.trim().is_empty() => {}
            _ => {
                return Err(CaError::MalformedName(format!(
                    "'{self}' has no common name"
                )));
            }
        }
        for (kind, value) in &self.attributes {
            if value.is_empty() {
                return Err(CaError::MalformedName(format!(
                    "empty {} attribute",
                    kind.short_name()
                )));
            }
            if *kind == AttributeType::Country
                && (value.len() != 2 || PrintableStringRef::new(value).is_err())
            {
                return Err(CaError::MalformedName(format!(
                    "country '{value}' is not a two-letter code"
                )));
            }
        }
        Ok(())
    }

    /// Encodes the name as an X.509 `Name`, one attribute per RDN.
    pub fn to_x509_name(&self) -> Result<x509_cert::name::Name> {
        self.validate()?;
        let rdns = self
            .attributes
            .iter()
            .map(|(kind, value)| -> Result<RelativeDistinguishedName> {
                let tag = match kind {
                    AttributeType::Country => Tag::PrintableString,
                    _ => Tag::Utf8String,
                };
                let atv = AttributeTypeAndValue {
                    oid: kind.oid(),
                    value: Any::new(tag, value.as_bytes())?,
                };
                Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RdnSequence(rdns))
    }

    /// Decodes an X.509 `Name`. String-typed values of any flavour are
    /// accepted; other value types are rejected.
    pub fn from_x509_name(name: &x509_cert::name::Name) -> Result<Self> {
        let mut attributes = Vec::new();
        for rdn in name.0.iter() {
            for atv in rdn.0.iter() {
                let value = match atv.value.tag() {
                    Tag::Utf8String
                    | Tag::PrintableString
                    | Tag::Ia5String
                    | Tag::TeletexString
                    | Tag::VisibleString => String::from_utf8(atv.value.value().to_vec())
                        .map_err(|e| CaError::MalformedName(e.to_string()))?,
                    other => {
                        return Err(CaError::MalformedName(format!(
                            "unsupported attribute value type {other}"
                        )));
                    }
                };
                attributes.push((AttributeType::from_oid(atv.oid), value));
            }
        }
        Ok(Self { attributes })
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .attributes
            .iter()
            .map(|(kind, value)| format!("{}={}", kind.short_name(), value))
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&rendered)
    }
}

/// Certificate validity period.
///
/// Both ends are truncated to whole seconds, the precision X.509 time
/// encodings carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity window, rejecting `not_before >= not_after`.
    pub fn new(not_before: OffsetDateTime, not_after: OffsetDateTime) -> Result<Self> {
        let not_before = not_before.replace_nanosecond(0)?;
        let not_after = not_after.replace_nanosecond(0)?;
        if not_before >= not_after {
            return Err(CaError::InvalidValidityWindow {
                not_before,
                not_after,
            });
        }
        Ok(Self {
            not_before,
            not_after,
        })
    }

    /// Creates a validity period starting now for the given number of days.
    pub fn for_days(days: i64) -> Result<Self> {
        let now = OffsetDateTime::now_utc();
        Self::new(now, days_after(now, days)?)
    }

    /// Returns true when `at` lies inside the window, both ends inclusive.
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

/// `from` plus `days` whole days, or [`CaError::LifetimeOutOfRange`] when
/// the result is not representable.
pub(crate) fn days_after(from: OffsetDateTime, days: i64) -> Result<OffsetDateTime> {
    days.checked_mul(86_400)
        .map(Duration::seconds)
        .and_then(|lifetime| from.checked_add(lifetime))
        .ok_or(CaError::LifetimeOutOfRange { from, days })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DistinguishedName {
        DistinguishedName::new()
            .country("MD")
            .organization("User Company")
            .common_name("user@example.com")
    }

    #[test]
    fn x509_name_round_trip_keeps_order() {
        let name = sample();
        let decoded = DistinguishedName::from_x509_name(&name.to_x509_name().unwrap()).unwrap();
        assert_eq!(decoded, name);
        assert_eq!(decoded.get_common_name(), Some("user@example.com"));
    }

    #[test]
    fn equality_is_order_sensitive() {
        let reordered = DistinguishedName::new()
            .organization("User Company")
            .country("MD")
            .common_name("user@example.com");
        assert_ne!(sample(), reordered);
    }

    #[test]
    fn common_name_is_required() {
        let name = DistinguishedName::new().organization("MyPKI");
        assert!(matches!(name.validate(), Err(CaError::MalformedName(_))));
        assert!(name.to_x509_name().is_err());
        let blank = DistinguishedName::new().common_name("  ");
        assert!(blank.validate().is_err());
    }

    #[test]
    fn country_must_be_two_letters() {
        let name = DistinguishedName::new().country("Moldova").common_name("x");
        assert!(name.validate().is_err());
    }

    #[test]
    fn validity_window_must_be_ordered() {
        let now = OffsetDateTime::now_utc();
        assert!(matches!(
            Validity::new(now, now),
            Err(CaError::InvalidValidityWindow { .. })
        ));
        assert!(Validity::new(now + Duration::days(1), now).is_err());
        assert!(matches!(
            Validity::for_days(i64::from(u32::MAX) * 365),
            Err(CaError::LifetimeOutOfRange { .. })
        ));
        assert!(matches!(
            Validity::for_days(i64::MAX),
            Err(CaError::LifetimeOutOfRange { .. })
        ));
        let validity = Validity::new(now, now + Duration::days(1)).unwrap();
        assert!(validity.contains(now + Duration::hours(1)));
        assert!(!validity.contains(now + Duration::days(2)));
    }
}
