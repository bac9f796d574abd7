use crate::error::IcpError;

/// The element type and dimension of a vertex set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexType {
    /// 2D vertices with `i32` coordinates.
    Int2,
    /// 3D vertices with `i32` coordinates.
    Int3,
    /// 2D vertices with `f32` coordinates.
    Float2,
    /// 3D vertices with `f32` coordinates.
    Float3,
    /// 2D vertices with `f64` coordinates.
    Double2,
    /// 3D vertices with `f64` coordinates.
    Double3,
}

impl VertexType {
    /// The dimension of a vertex of this type.
    pub fn dim(self) -> usize {
        match self {
            VertexType::Int2 | VertexType::Float2 | VertexType::Double2 => 2,
            VertexType::Int3 | VertexType::Float3 | VertexType::Double3 => 3,
        }
    }
}

/// An ordered set of vertices as produced by a geometric object.
#[derive(Debug, Clone, PartialEq)]
pub enum Vertices {
    /// Integer 2D vertices.
    I2(Vec<[i32; 2]>),
    /// Integer 3D vertices.
    I3(Vec<[i32; 3]>),
    /// Single precision 2D vertices.
    F2(Vec<[f32; 2]>),
    /// Single precision 3D vertices.
    F3(Vec<[f32; 3]>),
    /// Double precision 2D vertices.
    D2(Vec<[f64; 2]>),
    /// Double precision 3D vertices.
    D3(Vec<[f64; 3]>),
}

/// A vertex set converted to double precision.
#[derive(Debug, Clone, PartialEq)]
pub enum PromotedVertices {
    /// 2D vertices.
    D2(Vec<[f64; 2]>),
    /// 3D vertices.
    D3(Vec<[f64; 3]>),
}

impl PromotedVertices {
    /// The dimension of the vertices.
    pub fn dim(&self) -> usize {
        match self {
            PromotedVertices::D2(_) => 2,
            PromotedVertices::D3(_) => 3,
        }
    }

    /// The number of vertices.
    pub fn len(&self) -> usize {
        match self {
            PromotedVertices::D2(v) => v.len(),
            PromotedVertices::D3(v) => v.len(),
        }
    }

    /// Whether the set has no vertices.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn promote_points<T, const D: usize>(points: &[[T; D]]) -> Result<Vec<[f64; D]>, IcpError>
where
    T: Copy + Into<f64>,
{
    let mut promoted = Vec::new();
    promoted.try_reserve_exact(points.len())?;
    promoted.extend(points.iter().map(|p| p.map(Into::into)));
    Ok(promoted)
}

impl Vertices {
    /// The element type and dimension of the set.
    pub fn vertex_type(&self) -> VertexType {
        match self {
            Vertices::I2(_) => VertexType::Int2,
            Vertices::I3(_) => VertexType::Int3,
            Vertices::F2(_) => VertexType::Float2,
            Vertices::F3(_) => VertexType::Float3,
            Vertices::D2(_) => VertexType::Double2,
            Vertices::D3(_) => VertexType::Double3,
        }
    }

    /// The dimension of the vertices.
    pub fn dim(&self) -> usize {
        self.vertex_type().dim()
    }

    /// The number of vertices.
    pub fn len(&self) -> usize {
        match self {
            Vertices::I2(v) => v.len(),
            Vertices::I3(v) => v.len(),
            Vertices::F2(v) => v.len(),
            Vertices::F3(v) => v.len(),
            Vertices::D2(v) => v.len(),
            Vertices::D3(v) => v.len(),
        }
    }

    /// Whether the set has no vertices.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts the vertices to double precision, keeping their order.
    pub fn promote(&self) -> Result<PromotedVertices, IcpError> {
        Ok(match self {
            Vertices::I2(v) => PromotedVertices::D2(promote_points(v)?),
            Vertices::I3(v) => PromotedVertices::D3(promote_points(v)?),
            Vertices::F2(v) => PromotedVertices::D2(promote_points(v)?),
            Vertices::F3(v) => PromotedVertices::D3(promote_points(v)?),
            Vertices::D2(v) => PromotedVertices::D2(promote_points(v)?),
            Vertices::D3(v) => PromotedVertices::D3(promote_points(v)?),
        })
    }
}

/// Promotes a target and a source vertex set to double precision.
///
/// Both sets must be non-empty and share a dimension; nothing is converted
/// otherwise.
pub fn promote_pair(
    target: &Vertices,
    source: &Vertices,
) -> Result<(PromotedVertices, PromotedVertices), IcpError> {
    if target.dim() != source.dim() {
        return Err(IcpError::DimensionMismatch {
            target_dim: target.dim(),
            source_dim: source.dim(),
        });
    }
    if target.is_empty() {
        return Err(IcpError::EmptyVertexSet("target"));
    }
    if source.is_empty() {
        return Err(IcpError::EmptyVertexSet("source"));
    }

    Ok((target.promote()?, source.promote()?))
}

/// A geometric object from which registration vertices can be extracted.
pub trait VertexSource {
    /// Returns the vertices of the object.
    fn vertices(&self) -> Result<Vertices, IcpError>;
}

impl VertexSource for Vertices {
    fn vertices(&self) -> Result<Vertices, IcpError> {
        Ok(self.clone())
    }
}

impl<T: VertexSource + ?Sized> VertexSource for &T {
    fn vertices(&self) -> Result<Vertices, IcpError> {
        (**self).vertices()
    }
}
