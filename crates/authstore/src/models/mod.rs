//! Entity models.
//!
//! The four base records ([`Application`], [`Authorization`], [`Scope`],
//! [`Token`]) carry every persisted attribute. Multi-valued attributes hold
//! their encoded column form; stores expose typed accessors that go through
//! the configured [`Codec`](crate::codec::Codec).
//!
//! Applications can extend a base record by wrapping it in their own type and
//! implementing [`Model`]. A wrapper that sets [`Model::EXTENSION_PROPERTY`]
//! has its extra state stored under that key of the record's `properties`
//! column; other extra fields are reset to their defaults when an entity is
//! read back.

mod application;
mod authorization;
mod scope;
mod token;

pub use application::{Application, application_types, consent_types};
pub use authorization::Authorization;
pub use scope::Scope;
pub use token::{Token, token_types};

use serde_json::Value;

use crate::error::StoreResult;
use crate::key::EntityKey;
use crate::schema::{EntityKind, Row};

/// Any entity a store can be requested for.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Identifier type.
    type Key: EntityKey;
}

/// A base record with a fixed persisted layout.
pub trait Record: Entity + Default {
    /// Table family the record lives in.
    const KIND: EntityKind;

    /// Identifier, if assigned.
    fn id(&self) -> Option<&Self::Key>;

    /// Assigns the identifier.
    fn set_id(&mut self, id: Self::Key);

    /// Current concurrency token, if any.
    fn concurrency_token(&self) -> Option<&str>;

    /// Replaces the concurrency token.
    fn set_concurrency_token(&mut self, token: Option<String>);

    /// Converts the record into a persisted row.
    fn to_row(&self) -> Row;

    /// Reads a record back from a persisted row.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a column holds a value of the wrong type.
    fn from_row(row: Row) -> StoreResult<Self>;
}

/// A (possibly user-defined) specialization of a base record.
pub trait Model: Entity {
    /// The base record carrying the persisted attributes.
    type Base: Record<Key = Self::Key>;

    /// Borrows the base record.
    fn base(&self) -> &Self::Base;

    /// Mutably borrows the base record.
    fn base_mut(&mut self) -> &mut Self::Base;

    /// Builds the model around a base record read from storage.
    fn from_base(base: Self::Base) -> Self;

    /// Key of the `properties` entry holding [`Model::extension`]. `None`
    /// means the model has no persisted extra state.
    const EXTENSION_PROPERTY: Option<&'static str> = None;

    /// Extra state written on create and update.
    fn extension(&self) -> Value {
        Value::Null
    }

    /// Restores extra state read back from storage.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `value` does not fit the model.
    fn restore_extension(&mut self, _value: Value) -> StoreResult<()> {
        Ok(())
    }
}

macro_rules! base_model {
    ($record:ident) => {
        impl<K: EntityKey> Entity for $record<K> {
            type Key = K;
        }

        impl<K: EntityKey> Model for $record<K> {
            type Base = Self;

            fn base(&self) -> &Self {
                self
            }

            fn base_mut(&mut self) -> &mut Self {
                self
            }

            fn from_base(base: Self) -> Self {
                base
            }
        }
    };
}

base_model!(Application);
base_model!(Authorization);
base_model!(Scope);
base_model!(Token);

/// Reads an optional key column.
pub(crate) fn take_key<K: EntityKey>(row: &mut Row, column: &str) -> StoreResult<Option<K>> {
    row.take_key(column)?.map(K::from_key_value).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::columns;

    #[test]
    fn test_every_record_column_is_declared() {
        fn check<R: Record>(record: R) {
            for (name, _) in record.to_row().iter() {
                assert!(
                    R::KIND.column(name).is_some(),
                    "{} writes undeclared column {name}",
                    R::KIND
                );
            }
            assert_eq!(record.to_row().iter().count(), R::KIND.columns().len());
        }

        check(Application::<String>::default());
        check(Authorization::<String>::default());
        check(Scope::<String>::default());
        check(Token::<String>::default());
    }

    #[test]
    fn test_base_model_is_identity() {
        let mut scope = Scope::<i64>::default();
        scope.base_mut().name = Some("api".into());
        assert_eq!(scope.base().name.as_deref(), Some("api"));
        assert_eq!(Scope::from_base(scope.clone()), scope);
    }

    #[test]
    fn test_take_key_converts_type() {
        let mut row = Row::new().with(columns::ID, crate::key::KeyValue::Int(9));
        let id: Option<i64> = take_key(&mut row, columns::ID).unwrap();
        assert_eq!(id, Some(9));
    }
}
