// fusion_core/src/config/serde_helpers.rs

/// Reads a square matrix written either as a diagonal list (`[1.0, 2.0, 3.0]`)
/// or as a list of rows (`[[1.0, 0.0], [0.0, 1.0]]`).
pub mod dmatrix_rows_or_diagonal {
    use nalgebra::DMatrix;
    use serde::{self, de::Error, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MatrixRepr {
        Diagonal(Vec<f64>),
        Rows(Vec<Vec<f64>>),
    }

    pub fn serialize<S>(matrix: &DMatrix<f64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let rows: Vec<Vec<f64>> = matrix
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        serializer.collect_seq(rows.iter())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DMatrix<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match MatrixRepr::deserialize(deserializer)? {
            MatrixRepr::Diagonal(diag) => Ok(DMatrix::from_diagonal(
                &nalgebra::DVector::from_vec(diag),
            )),
            MatrixRepr::Rows(rows) => {
                let n = rows.len();
                if let Some(bad) = rows.iter().find(|row| row.len() != n) {
                    return Err(D::Error::custom(format!(
                        "matrix must be square: {} rows but a row has {} entries",
                        n,
                        bad.len()
                    )));
                }
                Ok(DMatrix::from_row_iterator(
                    n,
                    n,
                    rows.into_iter().flatten(),
                ))
            }
        }
    }
}
