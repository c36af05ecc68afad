//! Identity matcher: decides whether an event concerns a given target.

use blebridge_domain::id::Identified;

/// `true` iff both sides carry an identifier and the identifiers are equal.
///
/// A missing identifier is never a wildcard.
pub fn matches<A, B>(a: &A, b: &B) -> bool
where
    A: Identified + ?Sized,
    B: Identified + ?Sized,
{
    match (a.identifier(), b.identifier()) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use blebridge_domain::characteristic::CharacteristicValue;
    use blebridge_domain::device::Device;
    use blebridge_domain::event::Acknowledgement;
    use blebridge_domain::id::Identifier;

    #[test]
    fn should_match_equal_identifiers() {
        assert!(matches(&json!({ "identifier": "A" }), &json!({ "identifier": "A" })));
    }

    #[test]
    fn should_reject_different_identifiers() {
        assert!(!matches(&json!({ "identifier": "A" }), &json!({ "identifier": "B" })));
    }

    #[test]
    fn should_reject_when_either_side_lacks_identifier() {
        assert!(!matches(&json!({}), &json!({ "identifier": "A" })));
        assert!(!matches(&json!({ "identifier": "A" }), &json!({})));
        assert!(!matches(&json!({}), &json!({})));
    }

    #[test]
    fn should_match_typed_target_against_payload() {
        let device = Device::new("D1");
        assert!(matches(&device, &Acknowledgement::for_target("D1")));
        assert!(!matches(&device, &Acknowledgement::ok()));
        assert!(!matches(&device, &Acknowledgement::for_target("D2")));
    }

    #[test]
    fn should_compare_identifiers_as_opaque_text() {
        let target = Identifier::new("aa:bb");
        assert!(!matches(&target, &CharacteristicValue::from_bytes("AA:BB", &[])));
    }
}
