use curvecast_world::ShapeTable;

/// Wall-polygon table in upload form: two barycentric rows per triangle and
/// each wall's first triangle, four indices to a row.
#[derive(Debug, Clone, PartialEq)]
pub struct WallBlock {
    pub x: Vec<[f32; 4]>,
    pub y: Vec<[f32; 4]>,
    pub starts: Vec<[i32; 4]>,
}

impl WallBlock {
    pub fn from_shapes(shapes: &ShapeTable) -> Self {
        let (triangles, starts) = shapes.triangles();
        let mut x: Vec<[f32; 4]> = triangles.iter().map(|t| t.x.as_vec4().to_array()).collect();
        let mut y: Vec<[f32; 4]> = triangles.iter().map(|t| t.y.as_vec4().to_array()).collect();
        if x.is_empty() {
            x.push([0.0; 4]);
            y.push([0.0; 4]);
        }
        let packed = starts
            .chunks(4)
            .map(|chunk| {
                let mut row = [0i32; 4];
                for (slot, s) in row.iter_mut().zip(chunk) {
                    *slot = *s as i32;
                }
                row
            })
            .collect();
        Self {
            x,
            y,
            starts: packed,
        }
    }

    /// Rows per barycentric array; at least one.
    pub fn triangle_rows(&self) -> usize {
        self.x.len()
    }

    /// Bytes in the layout of the WGSL `Walls` struct.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity((self.x.len() * 2 + self.starts.len()) * 16);
        out.extend_from_slice(bytemuck::cast_slice(&self.x));
        out.extend_from_slice(bytemuck::cast_slice(&self.y));
        out.extend_from_slice(bytemuck::cast_slice(&self.starts));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvecast_common::Curvature;
    use curvecast_geometry::ConstantModel;
    use curvecast_world::Shape;

    #[test]
    fn cube_packs_four_triangles_per_face() {
        let model = ConstantModel::new(Curvature::Zero, 3);
        let block = WallBlock::from_shapes(&ShapeTable::single(Shape::cube(&model, 0.5)));
        assert_eq!(block.triangle_rows(), 24);
        // seven start indices (six walls and the end marker) in two rows
        assert_eq!(block.starts, vec![[0, 4, 8, 12], [16, 20, 24, 0]]);
        assert_eq!(block.to_bytes().len(), (24 * 2 + 2) * 16);
    }

    #[test]
    fn starts_follow_multiple_shapes() {
        let model = ConstantModel::new(Curvature::Zero, 3);
        let table = ShapeTable::new(vec![Shape::cube(&model, 0.5), Shape::cube(&model, 0.25)]);
        let block = WallBlock::from_shapes(&table);
        assert_eq!(block.triangle_rows(), 48);
        assert_eq!(block.starts.len(), 4);
        assert_eq!(block.starts[3][0], 48);
    }
}
