//! utils — Python-boundary conversion helpers.
//!
//! Only compiled with the `python-bindings` feature; native Rust callers pass
//! `ndarray` views directly.
#[cfg(feature = "python-bindings")]
use ndarray::Array1;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyTypeError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use numpy::{
    IntoPyArray,    // Vec → PyArray
    PyArrayMethods, // .readonly()
    PyReadonlyArray1,
};

#[cfg(feature = "python-bindings")]
use crate::scheduling::core::options::ScheduleOptions;

/// Accept a 1-D `numpy.ndarray`, `pandas.Series` or sequence of floats as a
/// contiguous read-only `f64` array.
#[cfg(feature = "python-bindings")]
#[inline]
pub fn extract_f64_array<'py>(
    py: Python<'py>, raw_data: &Bound<'py, PyAny>,
) -> PyResult<PyReadonlyArray1<'py, f64>> {
    if let Ok(arr_ro) = raw_data.extract::<PyReadonlyArray1<f64>>() {
        if arr_ro.as_slice().is_ok() {
            return Ok(arr_ro);
        }
    }

    if let Ok(obj) = raw_data.call_method("to_numpy", (false,), None) {
        if let Ok(series_ro) = obj.extract::<PyReadonlyArray1<f64>>() {
            if series_ro.as_slice().is_ok() {
                return Ok(series_ro);
            }
        }
    }

    let vec: Vec<f64> = raw_data.extract().map_err(|_| {
        PyTypeError::new_err("expected a 1-D numpy.ndarray, pandas.Series, or sequence of float64")
    })?;
    Ok(vec.into_pyarray(py).readonly())
}

/// Optional Python initial guess as an owned array.
#[cfg(feature = "python-bindings")]
pub fn extract_initial_guess<'py>(
    py: Python<'py>, raw: Option<&Bound<'py, PyAny>>,
) -> PyResult<Option<Array1<f64>>> {
    raw.map(|obj| Ok(extract_f64_array(py, obj)?.as_array().to_owned())).transpose()
}

/// Solver options from Python keyword arguments.
///
/// `tol = None` falls back to `fallback_tol`; `max_iter = None` keeps the
/// default iteration cap.
#[cfg(feature = "python-bindings")]
pub fn build_schedule_options(
    tol: Option<f64>, fallback_tol: f64, max_iter: Option<usize>,
) -> PyResult<ScheduleOptions> {
    let options = ScheduleOptions::with_tolerance(tol.unwrap_or(fallback_tol))?;
    match max_iter {
        Some(cap) => Ok(options.max_iter(cap)?),
        None => Ok(options),
    }
}
