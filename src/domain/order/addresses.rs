use uuid::Uuid;

use super::commands::AddressSpec;
use super::errors::ValidationError;
use super::value_objects::{Address, AddressRole};

/// Validate required postal fields and build a fresh address record.
/// Updates replace the previous record wholesale; nothing is merged.
pub fn build_address(address_id: Uuid, role: AddressRole, spec: &AddressSpec) -> Result<Address, ValidationError> {
    let required = [
        ("name", &spec.name),
        ("line1", &spec.line1),
        ("city", &spec.city),
        ("postal_code", &spec.postal_code),
        ("country", &spec.country),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField(field));
        }
    }

    Ok(Address {
        id: address_id,
        role,
        name: spec.name.trim().to_string(),
        line1: spec.line1.trim().to_string(),
        line2: optional(&spec.line2),
        city: spec.city.trim().to_string(),
        region: optional(&spec.region),
        postal_code: spec.postal_code.trim().to_string(),
        country: spec.country.trim().to_string(),
        phone: optional(&spec.phone),
    })
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> AddressSpec {
        AddressSpec {
            name: "Ada Lovelace".to_string(),
            line1: "12 St James's Square".to_string(),
            line2: Some("  ".to_string()),
            city: "London".to_string(),
            region: None,
            postal_code: "SW1Y 4JH".to_string(),
            country: "GB".to_string(),
            phone: None,
        }
    }

    #[test]
    fn test_complete_address_is_accepted() {
        let address = build_address(Uuid::new_v4(), AddressRole::Shipping, &complete()).unwrap();
        assert_eq!(address.role, AddressRole::Shipping);
        assert_eq!(address.line2, None);
    }

    #[test]
    fn test_each_required_field_is_checked() {
        let mut spec = complete();
        spec.city = String::new();
        assert_eq!(
            build_address(Uuid::new_v4(), AddressRole::Billing, &spec).unwrap_err(),
            ValidationError::MissingField("city")
        );

        let mut spec = complete();
        spec.postal_code = "   ".to_string();
        assert_eq!(
            build_address(Uuid::new_v4(), AddressRole::Billing, &spec).unwrap_err(),
            ValidationError::MissingField("postal_code")
        );
    }
}
