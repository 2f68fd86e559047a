use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Base of a product space `B² × E`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductBase {
    Hyperbolic,
    Spherical,
    Euclidean,
}

/// Sign of the sectional curvature of a constant-curvature model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curvature {
    Negative,
    Zero,
    Positive,
}

/// How rays are advanced through cells of a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarchFamily {
    /// Exact ray/wall intersection in the ambient model.
    ClosedForm,
    /// Adaptive Runge-Kutta integration of the geodesic equation.
    StepBased,
    /// No tracer exists.
    Unsupported,
}

/// Curvature model of the ambient space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Hyperbolic,
    Spherical,
    Euclidean,
    Nil,
    Solv,
    Product(ProductBase),
    /// Stretched (Berger) three-sphere.
    Stretched,
    Other,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 10] = [
        GeometryKind::Hyperbolic,
        GeometryKind::Spherical,
        GeometryKind::Euclidean,
        GeometryKind::Nil,
        GeometryKind::Solv,
        GeometryKind::Product(ProductBase::Hyperbolic),
        GeometryKind::Product(ProductBase::Spherical),
        GeometryKind::Product(ProductBase::Euclidean),
        GeometryKind::Stretched,
        GeometryKind::Other,
    ];

    pub fn family(self) -> MarchFamily {
        match self {
            Self::Hyperbolic | Self::Spherical | Self::Euclidean | Self::Product(_) => {
                MarchFamily::ClosedForm
            }
            Self::Nil | Self::Solv | Self::Stretched => MarchFamily::StepBased,
            Self::Other => MarchFamily::Unsupported,
        }
    }

    pub fn is_step_based(self) -> bool {
        self.family() == MarchFamily::StepBased
    }

    pub fn is_product(self) -> bool {
        matches!(self, Self::Product(_))
    }

    /// Curvature of the model the closed-form solver works in. For products
    /// this is the curvature of the base.
    pub fn curvature(self) -> Option<Curvature> {
        match self {
            Self::Hyperbolic | Self::Product(ProductBase::Hyperbolic) => Some(Curvature::Negative),
            Self::Spherical | Self::Product(ProductBase::Spherical) => Some(Curvature::Positive),
            Self::Euclidean | Self::Product(ProductBase::Euclidean) => Some(Curvature::Zero),
            _ => None,
        }
    }

    /// Volume grows exponentially with radius, so fog needs the short decay.
    pub fn exponential_growth(self) -> bool {
        matches!(self, Self::Hyperbolic | Self::Solv)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Hyperbolic => "h3",
            Self::Spherical => "s3",
            Self::Euclidean => "e3",
            Self::Nil => "nil",
            Self::Solv => "solv",
            Self::Product(ProductBase::Hyperbolic) => "h2xe",
            Self::Product(ProductBase::Spherical) => "s2xe",
            Self::Product(ProductBase::Euclidean) => "e2xe",
            Self::Stretched => "stretched",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown geometry '{0}' (expected one of h3, s3, e3, nil, solv, h2xe, s2xe, e2xe, stretched)")]
pub struct UnknownGeometry(pub String);

impl FromStr for GeometryKind {
    type Err = UnknownGeometry;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        GeometryKind::ALL
            .into_iter()
            .find(|k| k.name() == lower)
            .ok_or(UnknownGeometry(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families() {
        assert_eq!(GeometryKind::Hyperbolic.family(), MarchFamily::ClosedForm);
        assert_eq!(
            GeometryKind::Product(ProductBase::Spherical).family(),
            MarchFamily::ClosedForm
        );
        assert_eq!(GeometryKind::Nil.family(), MarchFamily::StepBased);
        assert_eq!(GeometryKind::Other.family(), MarchFamily::Unsupported);
    }

    #[test]
    fn parse_round_trip() {
        for kind in GeometryKind::ALL {
            assert_eq!(kind.name().parse::<GeometryKind>().unwrap(), kind);
        }
        assert!("hyperbolicish".parse::<GeometryKind>().is_err());
    }

    #[test]
    fn product_curvature_follows_base() {
        assert_eq!(
            GeometryKind::Product(ProductBase::Hyperbolic).curvature(),
            Some(Curvature::Negative)
        );
        assert_eq!(GeometryKind::Solv.curvature(), None);
    }
}
