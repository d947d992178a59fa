//! Textual form of the math values
//!
//! Locale-invariant, comma and/or whitespace delimited. `Identity` and `Empty`
//! stand for the distinguished identity matrix and the empty box/size.

use crate::error::MathError;
use crate::matrix::Matrix3D;
use crate::types::{Rect3D, Size3D};
use glam::DVec3;
use std::fmt;
use std::str::FromStr;

const IDENTITY_TOKEN: &str = "Identity";
const EMPTY_TOKEN: &str = "Empty";

fn parse_numbers<const N: usize>(kind: &'static str, input: &str) -> Result<[f64; N], MathError> {
    let error = |reason: String| MathError::Parse {
        kind,
        input: input.to_string(),
        reason,
    };

    let mut out = [0.0f64; N];
    let mut count = 0;
    for token in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if count == N {
            return Err(error(format!("expected {} values, found more", N)));
        }
        out[count] = token
            .parse::<f64>()
            .map_err(|e| error(format!("{token:?}: {e}")))?;
        count += 1;
    }

    if count != N {
        return Err(error(format!("expected {} values, found {}", N, count)));
    }
    Ok(out)
}

impl fmt::Display for Matrix3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identity() {
            return f.write_str(IDENTITY_TOKEN);
        }
        let rows = self.rows();
        let mut first = true;
        for value in rows.iter().flatten() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{value}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Matrix3D {
    type Err = MathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == IDENTITY_TOKEN {
            return Ok(Matrix3D::IDENTITY);
        }
        let v = parse_numbers::<16>("Matrix3D", trimmed)?;
        Ok(Matrix3D::from_rows([
            [v[0], v[1], v[2], v[3]],
            [v[4], v[5], v[6], v[7]],
            [v[8], v[9], v[10], v[11]],
            [v[12], v[13], v[14], v[15]],
        ]))
    }
}

impl fmt::Display for Size3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str(EMPTY_TOKEN);
        }
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

impl FromStr for Size3D {
    type Err = MathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == EMPTY_TOKEN {
            return Ok(Size3D::EMPTY);
        }
        let [x, y, z] = parse_numbers::<3>("Size3D", trimmed)?;
        Size3D::new(x, y, z)
    }
}

impl fmt::Display for Rect3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str(EMPTY_TOKEN);
        }
        let l = self.location;
        write!(f, "{},{},{},{}", l.x, l.y, l.z, self.size)
    }
}

impl FromStr for Rect3D {
    type Err = MathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == EMPTY_TOKEN {
            return Ok(Rect3D::EMPTY);
        }
        let [x, y, z, sx, sy, sz] = parse_numbers::<6>("Rect3D", trimmed)?;
        Ok(Rect3D::new(DVec3::new(x, y, z), Size3D::new(sx, sy, sz)?))
    }
}
