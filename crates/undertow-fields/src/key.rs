use serde::{Deserialize, Serialize};

/// A spatial axis of the simulation grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// The array axis this spatial axis maps to. Fields are laid out as `(z, y, x)`.
    #[inline(always)]
    pub fn array_axis(self) -> ndarray::Axis {
        match self {
            Axis::X => ndarray::Axis(2),
            Axis::Y => ndarray::Axis(1),
            Axis::Z => ndarray::Axis(0),
        }
    }

    /// Position of this axis's component in an `(x, y, z)` velocity triple.
    #[inline(always)]
    pub fn component(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Axes that exist for the given dimensionality.
    pub fn active(two_dim: bool) -> &'static [Axis] {
        const PLANAR: [Axis; 2] = [Axis::X, Axis::Y];

        if two_dim {
            &PLANAR
        } else {
            &Self::ALL
        }
    }
}

/// Every field carried by a frame. `*Div` fields are the divergent network inputs, the rest are
/// targets (plus geometry, which is shared).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldKey {
    Pressure,
    VelocityX,
    VelocityY,
    VelocityZ,
    Geometry,
    PressureDiv,
    VelocityDivX,
    VelocityDivY,
    VelocityDivZ,
}

impl FieldKey {
    pub const COUNT: usize = 9;

    pub const ALL: [FieldKey; Self::COUNT] = [
        FieldKey::Pressure,
        FieldKey::VelocityX,
        FieldKey::VelocityY,
        FieldKey::VelocityZ,
        FieldKey::Geometry,
        FieldKey::PressureDiv,
        FieldKey::VelocityDivX,
        FieldKey::VelocityDivY,
        FieldKey::VelocityDivZ,
    ];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldKey::Pressure => "p",
            FieldKey::VelocityX => "Ux",
            FieldKey::VelocityY => "Uy",
            FieldKey::VelocityZ => "Uz",
            FieldKey::Geometry => "geom",
            FieldKey::PressureDiv => "pDiv",
            FieldKey::VelocityDivX => "UDivx",
            FieldKey::VelocityDivY => "UDivy",
            FieldKey::VelocityDivZ => "UDivz",
        }
    }

    /// Whether this field belongs to the divergent (input) set.
    pub fn is_divergent(self) -> bool {
        match self {
            FieldKey::PressureDiv
            | FieldKey::VelocityDivX
            | FieldKey::VelocityDivY
            | FieldKey::VelocityDivZ => true,
            FieldKey::Pressure
            | FieldKey::VelocityX
            | FieldKey::VelocityY
            | FieldKey::VelocityZ
            | FieldKey::Geometry => false,
        }
    }

    /// The axis a velocity component is aligned with, or `None` for scalar fields.
    pub fn velocity_axis(self) -> Option<Axis> {
        match self {
            FieldKey::VelocityX | FieldKey::VelocityDivX => Some(Axis::X),
            FieldKey::VelocityY | FieldKey::VelocityDivY => Some(Axis::Y),
            FieldKey::VelocityZ | FieldKey::VelocityDivZ => Some(Axis::Z),
            FieldKey::Pressure | FieldKey::PressureDiv | FieldKey::Geometry => None,
        }
    }

    pub fn velocity(axis: Axis, divergent: bool) -> FieldKey {
        match (axis, divergent) {
            (Axis::X, false) => FieldKey::VelocityX,
            (Axis::Y, false) => FieldKey::VelocityY,
            (Axis::Z, false) => FieldKey::VelocityZ,
            (Axis::X, true) => FieldKey::VelocityDivX,
            (Axis::Y, true) => FieldKey::VelocityDivY,
            (Axis::Z, true) => FieldKey::VelocityDivZ,
        }
    }

    pub fn pressure(divergent: bool) -> FieldKey {
        if divergent {
            FieldKey::PressureDiv
        } else {
            FieldKey::Pressure
        }
    }

    /// Keys that carry data for the given dimensionality; `z` velocities are dropped in 2D.
    pub fn active(two_dim: bool) -> impl Iterator<Item = FieldKey> {
        Self::ALL
            .into_iter()
            .filter(move |key| !(two_dim && key.velocity_axis() == Some(Axis::Z)))
    }
}
