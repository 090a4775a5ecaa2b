use textplots::{Chart, Plot, Shape};

use crate::error::ScopeError;

/// Determine the best scale and unit prefix for a given maximum value
fn determine_scale(max_value: f64) -> (f64, &'static str) {
    if max_value >= 1.0 {
        (1.0, "")
    } else if max_value >= 1e-3 {
        (1e3, "m")
    } else if max_value >= 1e-6 {
        (1e6, "μ")
    } else if max_value >= 1e-9 {
        (1e9, "n")
    } else {
        (1e12, "p")
    }
}

/// Reduce a long record to at most `columns` min/max pairs so that peaks
/// survive at terminal resolution
fn decimate(time: &[f64], voltage: &[f64], columns: usize) -> Vec<(f64, f64)> {
    if time.len() <= columns * 2 {
        return time.iter().copied().zip(voltage.iter().copied()).collect();
    }

    let bucket = time.len().div_ceil(columns);
    let mut points = Vec::with_capacity(columns * 2);
    for (t, v) in time.chunks(bucket).zip(voltage.chunks(bucket)) {
        let (min_i, max_i) = v.iter().enumerate().fold((0, 0), |(lo, hi), (i, &x)| {
            (if x < v[lo] { i } else { lo }, if x > v[hi] { i } else { hi })
        });
        let (first, second) = if min_i <= max_i { (min_i, max_i) } else { (max_i, min_i) };
        points.push((t[first], v[first]));
        if second != first {
            points.push((t[second], v[second]));
        }
    }
    points
}

/// Draw a waveform as a terminal line chart with labelled axes.
///
/// # Arguments
/// * `time` - Time axis in seconds
/// * `voltage` - Samples in volts, same length as `time`
/// * `title` - Optional title for the plot
/// * `width` - Optional plot width (default: 140)
/// * `height` - Optional plot height (default: 60)
///
/// # Examples
/// ```
/// use scope_acq::plotting::plot_waveform;
///
/// let time = vec![0.0, 1e-3, 2e-3, 3e-3];
/// let voltage = vec![0.0, 0.02, -0.01, 0.0];
/// plot_waveform(&time, &voltage, Some("Waveform from Channel 1"), None, None).unwrap();
/// ```
pub fn plot_waveform(
    time: &[f64],
    voltage: &[f64],
    title: Option<&str>,
    width: Option<usize>,
    height: Option<usize>,
) -> Result<(), ScopeError> {
    if voltage.is_empty() {
        return Err(ScopeError::InvalidValue("Cannot plot empty data".to_string()));
    }
    if time.len() != voltage.len() {
        return Err(ScopeError::InvalidValue(format!(
            "Cannot plot {} time points against {} samples",
            time.len(),
            voltage.len()
        )));
    }

    let width = width.unwrap_or(140);
    let height = height.unwrap_or(60);
    // textplots panics below these sizes
    if width < 32 || height < 3 {
        return Err(ScopeError::InvalidValue(format!(
            "Plot area {width}x{height} is too small, need at least 32x3"
        )));
    }

    let min_value = voltage.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max_value = voltage.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let max_abs = max_value.abs().max(min_value.abs());
    let (value_scale, value_unit) = determine_scale(max_abs);

    let t_start = time[0];
    let t_end = time[time.len() - 1];
    let (time_scale, time_unit) = determine_scale(t_end.abs().max(t_start.abs()));

    let frame: Vec<(f32, f32)> = decimate(time, voltage, width)
        .into_iter()
        .map(|(t, v)| ((t * time_scale) as f32, (v * value_scale) as f32))
        .collect();

    let x_min = (t_start * time_scale) as f32;
    // textplots needs a non-empty x range
    let x_max = ((t_end * time_scale) as f32).max(x_min + f32::EPSILON);

    println!("{}", title.unwrap_or("Waveform"));
    println!("X-axis: Time ({time_unit}s) | Y-axis: Voltage ({value_unit}V)");
    println!(
        "Range: {} samples over {:.3} {}s | Values: {:.3} to {:.3} {}V",
        voltage.len(),
        (t_end - t_start) * time_scale,
        time_unit,
        min_value * value_scale,
        max_value * value_scale,
        value_unit
    );
    println!("{}", "─".repeat(width));

    Chart::new(width as u32, height as u32, x_min, x_max)
        .lineplot(&Shape::Lines(&frame))
        .nice();

    println!("Time ({time_unit}s) →");

    Ok(())
}
