// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! OFF mesh text format
//!
//! ```text
//! OFF
//! # comments and blank lines are skipped
//! <vertices> <faces> <edges>
//! x y z                 (one line per vertex)
//! n i_0 .. i_{n-1} ...  (one line per face, trailing colour values ignored)
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use idf_nexus_model::{CylindricalMesh, OffMesh, Point};
use nalgebra::{Rotation3, Vector3};

use crate::error::{Error, Result};

/// Non-comment lines with their 1-based line numbers
struct Lines<R> {
    inner: std::io::Lines<R>,
    number: usize,
}

impl<R: BufRead> Lines<R> {
    fn next_content(&mut self) -> Result<Option<(usize, String)>> {
        for line in self.inner.by_ref() {
            self.number += 1;
            let line = line?;
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                return Ok(Some((self.number, trimmed.to_string())));
            }
        }
        Ok(None)
    }

    fn expect_content(&mut self, what: &str) -> Result<(usize, String)> {
        self.next_content()?
            .ok_or_else(|| Error::off_format(self.number, format!("unexpected end of file, expected {}", what)))
    }
}

// Header counts are untrusted until the lines are actually read
const MAX_PREALLOCATED: usize = 1 << 20;

fn parse_number<T: lexical_core::FromLexical>(token: &str, line: usize) -> Result<T> {
    lexical_core::parse(token.as_bytes())
        .map_err(|_| Error::off_format(line, format!("'{}' is not a number", token)))
}

/// Read an OFF mesh
pub fn read_off<R: BufRead>(reader: R) -> Result<OffMesh> {
    let mut lines = Lines {
        inner: reader.lines(),
        number: 0,
    };

    let (line, header) = lines.expect_content("OFF header")?;
    if header != "OFF" {
        return Err(Error::off_format(line, format!("expected 'OFF', found '{}'", header)));
    }

    let (line, counts) = lines.expect_content("vertex and face counts")?;
    let counts: Vec<usize> = counts
        .split_whitespace()
        .take(2)
        .map(|t| parse_number(t, line))
        .collect::<Result<_>>()?;
    let [vertex_count, face_count] = counts[..] else {
        return Err(Error::off_format(line, "expected vertex and face counts"));
    };

    let mut vertices = Vec::with_capacity(vertex_count.min(MAX_PREALLOCATED));
    for _ in 0..vertex_count {
        let (line, text) = lines.expect_content("vertex")?;
        let coords: Vec<f64> = text
            .split_whitespace()
            .take(3)
            .map(|t| parse_number(t, line))
            .collect::<Result<_>>()?;
        let [x, y, z] = coords[..] else {
            return Err(Error::off_format(line, "vertex needs three coordinates"));
        };
        vertices.push(Point::new(x, y, z));
    }

    let mut polygons = Vec::with_capacity(face_count.min(MAX_PREALLOCATED));
    for _ in 0..face_count {
        let (line, text) = lines.expect_content("face")?;
        let mut tokens = text.split_whitespace();
        let n: usize = parse_number(tokens.next().unwrap_or_default(), line)?;
        let polygon: Vec<u32> = tokens
            .take(n)
            .map(|t| parse_number(t, line))
            .collect::<Result<_>>()?;
        if polygon.len() != n {
            return Err(Error::off_format(
                line,
                format!("face declares {} vertices but lists {}", n, polygon.len()),
            ));
        }
        if let Some(&bad) = polygon.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(Error::off_format(line, format!("vertex index {} out of range", bad)));
        }
        polygons.push(polygon);
    }

    Ok(OffMesh::from_polygons(vertices, &polygons))
}

/// Write an OFF mesh
pub fn write_off<W: Write>(mut writer: W, mesh: &OffMesh) -> Result<()> {
    writeln!(writer, "OFF")?;
    writeln!(writer, "# NVertices NFaces NEdges")?;
    writeln!(writer, "{} {} 0", mesh.vertex_count(), mesh.face_count())?;
    writeln!(writer, "# Vertices")?;
    for v in &mesh.vertices {
        writeln!(writer, "{} {} {}", v.x, v.y, v.z)?;
    }
    writeln!(writer, "# Faces")?;
    for face in mesh.polygons() {
        write!(writer, "{}", face.len())?;
        for index in face {
            write!(writer, " {}", index)?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_off_file(path: impl AsRef<Path>) -> Result<OffMesh> {
    read_off(BufReader::new(File::open(path)?))
}

pub fn write_off_file(path: impl AsRef<Path>, mesh: &OffMesh) -> Result<()> {
    write_off(BufWriter::new(File::create(path)?), mesh)
}

/// Flatten OFF-style faces into `(winding_order, faces)`
///
/// Each input face is its vertex count followed by that many indices.
pub fn create_off_face_vertex_map(off_faces: &[Vec<u32>]) -> Result<(Vec<u32>, Vec<u32>)> {
    let mut faces = Vec::with_capacity(off_faces.len());
    let mut winding_order = Vec::new();
    for (i, face) in off_faces.iter().enumerate() {
        let Some((&count, indices)) = face.split_first() else {
            return Err(Error::invalid_mesh(format!("face {} is empty", i)));
        };
        if count as usize != indices.len() {
            return Err(Error::invalid_mesh(format!(
                "face {} declares {} vertices but lists {}",
                i,
                count,
                indices.len()
            )));
        }
        faces.push(winding_order.len() as u32);
        winding_order.extend_from_slice(indices);
    }
    Ok((winding_order, faces))
}

/// Open tube of quadrilaterals around `axis`, centred on `centre`
///
/// The tube has `segments` points around each end and one quad between
/// each pair of neighbouring points; the end caps are not closed.
pub fn construct_cylinder_mesh(
    height: f64,
    radius: f64,
    axis: &Point,
    centre: &Point,
    segments: usize,
) -> OffMesh {
    let segments = segments.max(3);
    let half = height * 0.5;

    // Built along x, then turned onto the axis. Anti-parallel axes give the
    // same tube, so no rotation is needed for them.
    let rotation = Rotation3::rotation_between(&Vector3::x(), axis).unwrap_or_else(Rotation3::identity);
    let mut vertices = Vec::with_capacity(2 * segments);
    for x in [-half, half] {
        for k in 0..segments {
            let angle = std::f64::consts::TAU * k as f64 / segments as f64;
            let local = Point::new(x, radius * angle.cos(), radius * angle.sin());
            vertices.push(rotation * local + centre);
        }
    }

    let n = segments as u32;
    let polygons: Vec<Vec<u32>> = (0..n)
        .map(|k| {
            let next = (k + 1) % n;
            vec![k, k + n, next + n, next]
        })
        .collect();
    OffMesh::from_polygons(vertices, &polygons)
}

/// Mesh every cylinder of a cylindrical geometry as an open tube
pub fn cylinders_to_off(mesh: &CylindricalMesh, segments: usize) -> Result<OffMesh> {
    let mut off = OffMesh::default();
    for (i, &[a, b, c]) in mesh.cylinders.iter().enumerate() {
        let vertex = |index: u32| {
            mesh.vertices.get(index as usize).copied().ok_or_else(|| {
                Error::invalid_mesh(format!("cylinder {} refers to missing vertex {}", i, index))
            })
        };
        let (a, b, c) = (vertex(a)?, vertex(b)?, vertex(c)?);
        let axis = c - a;
        let height = axis.norm();
        if height == 0.0 {
            return Err(Error::invalid_mesh(format!("cylinder {} has zero height", i)));
        }
        let tube = construct_cylinder_mesh(height, (b - a).norm(), &(axis / height), &((a + c) * 0.5), segments);
        off.append(&tube);
    }
    Ok(off)
}
