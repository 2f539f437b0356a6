//! Classification enums stored in the XML index as integer codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BasinError;

macro_rules! coded_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Integer code used in the XML index.
            pub fn code(self) -> i32 {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            /// Inverse of [`Self::code`].
            pub fn from_code(code: i32) -> Result<Self, BasinError> {
                match code {
                    $($code => Ok(Self::$variant),)+
                    other => Err(BasinError::Format(format!(
                        "unknown {} code {other}",
                        stringify!($name)
                    ))),
                }
            }
        }
    };
}

coded_enum!(
    /// Whether a surface or volume lies in the sediment column or below it.
    SubsurfaceKind {
        Sediment = 0,
        Basement = 1,
        None = 2,
    }
);

coded_enum!(
    /// The object a property is evaluated on.
    PropertyType {
        Reservoir = 0,
        Formation = 1,
        Trap = 2,
    }
);

coded_enum!(
    /// Dimensionality and continuity of a property.
    PropertyAttribute {
        Continuous3D = 0,
        Discontinuous3D = 1,
        Surface2D = 2,
        Formation2D = 3,
        Other = 4,
    }
);

coded_enum!(
    /// Origin of a snapshot age.
    SnapShotKind {
        System = 0,
        UserDefined = 1,
        None = 2,
    }
);

coded_enum!(
    /// Simulation mode of the project.
    ModellingMode {
        OneD = 0,
        ThreeD = 1,
    }
);

/// Element ordering of a float payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    /// 2D row-major: I fastest, then J.
    IJ,
    /// 3D: I fastest, then J, then K.
    IJK,
    /// 3D: K fastest, then I, then J.
    KIJ,
}

/// On-disk encoding of a payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = BasinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            other => Err(BasinError::Format(format!("unsupported compression '{other}'"))),
        }
    }
}
