use crate::error::IntakeError;
use crate::models::{AuditAction, AuditEntry, Caller, CallerId, CallerInput};
use crate::store::RecordStore;
use tracing::{debug, info};

/// Documents shorter than this are not worth a lookup.
pub const MIN_DOCUMENT_DIGITS: usize = 7;
/// Phones shorter than this are not worth a lookup.
pub const MIN_PHONE_DIGITS: usize = 8;

pub fn digit_count(value: &str) -> usize {
    value.chars().filter(char::is_ascii_digit).count()
}

/// Looks the caller up by document first, then by primary or secondary phone.
///
/// Both lookups run when both keys are usable; if they land on different
/// callers the match is ambiguous and left to the operator.
pub fn resolve_caller(
    store: &dyn RecordStore,
    document: Option<&str>,
    phone: Option<&str>,
) -> Result<Option<CallerId>, IntakeError> {
    let by_document = match document.map(str::trim) {
        Some(doc) if digit_count(doc) >= MIN_DOCUMENT_DIGITS => {
            store.find_caller_by_document(doc)?.map(|c| c.id)
        }
        _ => None,
    };
    let by_phone = match phone.map(str::trim) {
        Some(phone) if digit_count(phone) >= MIN_PHONE_DIGITS => {
            store.find_caller_by_phone(phone)?.map(|c| c.id)
        }
        _ => None,
    };

    match (by_document, by_phone) {
        (Some(doc), Some(phone)) if doc != phone => {
            debug!(by_document = doc, by_phone = phone, "ambiguous caller match");
            Err(IntakeError::AmbiguousCallerMatch {
                by_document: doc,
                by_phone: phone,
            })
        }
        (Some(id), _) | (None, Some(id)) => Ok(Some(id)),
        (None, None) => Ok(None),
    }
}

fn validate(input: &CallerInput) -> Result<CallerInput, IntakeError> {
    let mut clean = input.clone();
    clean.given_name = input.given_name.trim().to_string();
    clean.family_name = input.family_name.trim().to_string();
    clean.phone = input.phone.trim().to_string();
    clean.document = input
        .document
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    clean.secondary_phone = input
        .secondary_phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    let mut missing = Vec::new();
    if clean.given_name.is_empty() {
        missing.push("given_name");
    }
    if clean.family_name.is_empty() {
        missing.push("family_name");
    }
    if clean.phone.is_empty() {
        missing.push("phone");
    }
    if !missing.is_empty() {
        return Err(IntakeError::InvalidCaller(format!(
            "missing {}",
            missing.join(", ")
        )));
    }
    Ok(clean)
}

/// Returns the existing caller amended with `input`, or a newly created one.
///
/// Amending overwrites the stored fields; the previous snapshot is kept in
/// the `CallerAmended` audit entry.
pub fn find_or_create(
    store: &dyn RecordStore,
    input: &CallerInput,
    operator: &str,
) -> Result<Caller, IntakeError> {
    let input = validate(input)?;
    let existing = resolve_caller(store, input.document.as_deref(), Some(&input.phone))?;

    if let Some(id) = existing {
        let previous = store
            .get_caller(id)?
            .ok_or(IntakeError::CallerNotFound(id))?;
        let audit = AuditEntry::new(
            AuditAction::CallerAmended,
            None,
            operator,
            format!("caller {} amended", previous.full_name()),
        )
        .with_details(serde_json::json!({ "previous": previous }));
        let updated = store
            .update_caller(id, &input, &audit)?
            .ok_or(IntakeError::CallerNotFound(id))?;
        info!(caller_id = id, "caller amended");
        return Ok(updated);
    }

    let audit = AuditEntry::new(
        AuditAction::CallerCreated,
        None,
        operator,
        format!("caller {} {} registered", input.given_name, input.family_name),
    );
    let created = store.create_caller(&input, &audit)?;
    info!(caller_id = created.id, "caller created");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Address;
    use crate::store::tests::db_path;
    use crate::store::SqliteStore;

    fn input(document: Option<&str>, phone: &str, secondary: Option<&str>) -> CallerInput {
        CallerInput {
            document: document.map(str::to_string),
            given_name: "Marta".into(),
            family_name: "Gómez".into(),
            phone: phone.into(),
            secondary_phone: secondary.map(str::to_string),
            address: Address {
                street: "Belgrano".into(),
                number: "45".into(),
                ..Address::default()
            },
            ..CallerInput::default()
        }
    }

    #[test]
    fn counts_only_digits() {
        assert_eq!(digit_count("351-400 0000"), 10);
        assert_eq!(digit_count("12.345.678"), 8);
        assert_eq!(digit_count(""), 0);
    }

    #[test]
    fn short_keys_skip_lookup() {
        let store = SqliteStore::open(&db_path("short-keys")).expect("open");
        find_or_create(&store, &input(Some("123456"), "1234567", None), "op").expect("create");
        assert_eq!(
            resolve_caller(&store, Some("123456"), Some("1234567")).expect("resolve"),
            None
        );
    }

    #[test]
    fn secondary_phone_resolves_existing_caller() {
        let store = SqliteStore::open(&db_path("secondary")).expect("open");
        let created = find_or_create(&store, &input(None, "3514000000", Some("3515222222")), "op")
            .expect("create");
        assert_eq!(
            resolve_caller(&store, None, Some("3515222222")).expect("resolve"),
            Some(created.id)
        );
    }

    #[test]
    fn repeat_caller_is_amended_with_audit_snapshot() {
        let store = SqliteStore::open(&db_path("amend")).expect("open");
        let first = find_or_create(&store, &input(Some("30111222"), "3514000000", None), "op")
            .expect("create");

        let mut changed = input(Some("30111222"), "3514000000", None);
        changed.address.street = "Colón".into();
        let second = find_or_create(&store, &changed, "op").expect("amend");

        assert_eq!(second.id, first.id);
        assert_eq!(second.address.street, "Colón");

        let trail = store.audit_after(0).expect("audit");
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[1].action, AuditAction::CallerAmended);
        let previous_street = trail[1]
            .details
            .as_ref()
            .and_then(|d| d.pointer("/previous/address/street"))
            .and_then(|v| v.as_str());
        assert_eq!(previous_street, Some("Belgrano"));
    }

    #[test]
    fn conflicting_lookups_are_ambiguous() {
        let store = SqliteStore::open(&db_path("ambiguous")).expect("open");
        let a = find_or_create(&store, &input(Some("30111222"), "3514000000", None), "op")
            .expect("a");
        let b = find_or_create(&store, &input(Some("28999888"), "3517000000", None), "op")
            .expect("b");

        let err = resolve_caller(&store, Some("30111222"), Some("3517000000"))
            .expect_err("ambiguous");
        assert!(matches!(
            err,
            IntakeError::AmbiguousCallerMatch { by_document, by_phone }
                if by_document == a.id && by_phone == b.id
        ));
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        let store = SqliteStore::open(&db_path("invalid")).expect("open");
        let mut bad = input(None, "  ", None);
        bad.family_name = String::new();
        let err = find_or_create(&store, &bad, "op").expect_err("invalid");
        assert!(matches!(err, IntakeError::InvalidCaller(msg) if msg == "missing family_name, phone"));
    }
}
