//! Capabilities an entity exposes to the audit builder.

use serde::Serialize;
use std::fmt::Display;

/// An entity whose mutations are audited.
///
/// The serde representation becomes the record's snapshot. Entities
/// without an identifier keep the default `entity_id`, which yields a
/// record with no `entityId`.
pub trait Auditable: Serialize {
    /// Type name stored as `entityName`, e.g. `"Account"`.
    fn entity_name(&self) -> &str;

    /// String form of the identifier, if the entity has one yet.
    fn entity_id(&self) -> Option<String> {
        None
    }
}

/// An entity with a typed identifier.
pub trait HasIdentifier {
    type Id: Display;

    /// The identifier; `None` until one is assigned (e.g. before first insert).
    fn identifier(&self) -> Option<&Self::Id>;
}

/// Implement [`Auditable`] (and [`HasIdentifier`] when an id field is
/// named) for a struct.
///
/// ```
/// use auditline_audit_capture::{auditable, Auditable};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Account { id: u64, owner: String }
/// auditable!(Account as "Account", id: u64);
///
/// #[derive(Serialize)]
/// struct Draft { id: Option<String> }
/// auditable!(Draft as "Draft", id?: String);
///
/// #[derive(Serialize)]
/// struct Setting { key: String }
/// auditable!(Setting as "Setting");
///
/// assert_eq!(Account { id: 42, owner: "alice".into() }.entity_id().as_deref(), Some("42"));
/// assert_eq!(Draft { id: None }.entity_id(), None);
/// assert_eq!(Setting { key: "k".into() }.entity_id(), None);
/// ```
#[macro_export]
macro_rules! auditable {
    (@identified $ty:ty, $name:literal) => {
        impl $crate::Auditable for $ty {
            fn entity_name(&self) -> &str {
                $name
            }

            fn entity_id(&self) -> Option<String> {
                $crate::HasIdentifier::identifier(self).map(|id| id.to_string())
            }
        }
    };
    ($ty:ty as $name:literal $(,)?) => {
        impl $crate::Auditable for $ty {
            fn entity_name(&self) -> &str {
                $name
            }
        }
    };
    ($ty:ty as $name:literal, $field:ident : $id:ty $(,)?) => {
        impl $crate::HasIdentifier for $ty {
            type Id = $id;

            fn identifier(&self) -> Option<&Self::Id> {
                Some(&self.$field)
            }
        }

        $crate::auditable!(@identified $ty, $name);
    };
    ($ty:ty as $name:literal, $field:ident ? : $id:ty $(,)?) => {
        impl $crate::HasIdentifier for $ty {
            type Id = $id;

            fn identifier(&self) -> Option<&Self::Id> {
                self.$field.as_ref()
            }
        }

        $crate::auditable!(@identified $ty, $name);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Serialize)]
    struct Account {
        id: u64,
    }
    crate::auditable!(Account as "Account", id: u64);

    #[derive(Serialize)]
    struct Customer {
        customer_id: Option<uuid_like::Id>,
    }
    crate::auditable!(Customer as "Customer", customer_id?: uuid_like::Id);

    mod uuid_like {
        use serde::Serialize;

        #[derive(Serialize)]
        pub struct Id(pub &'static str);

        impl std::fmt::Display for Id {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "cust-{}", self.0)
            }
        }
    }

    #[derive(Serialize)]
    struct Setting;
    crate::auditable!(Setting as "Setting");

    struct Manual;

    impl Serialize for Manual {
        fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_unit()
        }
    }

    impl Auditable for Manual {
        fn entity_name(&self) -> &str {
            "Manual"
        }
    }

    #[test]
    fn test_identifier_uses_display_form() {
        assert_eq!(Account { id: 42 }.entity_id().as_deref(), Some("42"));
        assert_eq!(Account { id: 42 }.identifier(), Some(&42));
        let customer = Customer { customer_id: Some(uuid_like::Id("7")) };
        assert_eq!(customer.entity_id().as_deref(), Some("cust-7"));
    }

    #[test]
    fn test_missing_identifier_is_none() {
        assert_eq!(Customer { customer_id: None }.entity_id(), None);
        assert_eq!(Setting.entity_id(), None);
        assert_eq!(Manual.entity_id(), None);
        assert_eq!(Setting.entity_name(), "Setting");
    }

    proptest! {
        #[test]
        fn entity_id_matches_to_string(id in any::<u64>()) {
            prop_assert_eq!(Account { id }.entity_id(), Some(id.to_string()));
        }
    }
}
