use serde::{Deserialize, Serialize};

use crate::error::{BasinError, BasinResult};
use crate::kinds::{PropertyAttribute, PropertyType};

/// Immutable description of a simulated property.
///
/// Properties compare equal by `name` alone; the other fields are
/// descriptive. Construction rejects empty names.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Property {
    name: String,
    user_name: String,
    native_name: String,
    unit: String,
    property_type: PropertyType,
    attribute: PropertyAttribute,
}

impl Property {
    pub fn new(
        name: impl Into<String>,
        user_name: impl Into<String>,
        native_name: impl Into<String>,
        unit: impl Into<String>,
        property_type: PropertyType,
        attribute: PropertyAttribute,
    ) -> BasinResult<Self> {
        let (name, user_name, native_name) = (name.into(), user_name.into(), native_name.into());
        for (field, value) in [("name", &name), ("user name", &user_name), ("native name", &native_name)] {
            if value.is_empty() {
                return Err(BasinError::InvalidArgument(format!("property {field} cannot be empty")));
            }
        }
        Ok(Self {
            name,
            user_name,
            native_name,
            unit: unit.into(),
            property_type,
            attribute,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Name of the property inside the simulator.
    pub fn native_name(&self) -> &str {
        &self.native_name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn attribute(&self) -> PropertyAttribute {
        self.attribute
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Property {}
