//! Hardware error code decoder
//! Converts numeric driver codes to operator-readable messages

use sbemkit_core::HardwareFault;

/// Decode a driver error code to a human-readable message
pub fn decode_error(code: u32) -> String {
    match code {
        0 => "No error.".to_string(),

        // Microtome / stage (2xx)
        201 => "Microtome not responding. Check the controller connection.".to_string(),
        202 => "Stage XY move failed or did not reach its target.".to_string(),
        203 => "Stage Z move failed or did not reach its target.".to_string(),
        204 => "Knife did not reach the requested position.".to_string(),
        205 => "Cut cycle did not complete.".to_string(),
        206 => "Z position mismatch. The stage Z differs from the last known position.".to_string(),

        // Microscope (3xx)
        301 => "Beam (EHT) could not be switched.".to_string(),
        302 => "Frame acquisition failed.".to_string(),
        303 => "Scan settings were rejected by the microscope.".to_string(),

        _ => format!("Unknown error code: {}", code),
    }
}

/// Operator message for a fault, with the next step to take
pub fn describe_fault(fault: &HardwareFault) -> String {
    match fault {
        HardwareFault::ZMismatch { cause } => format!(
            "The current Z position does not match the last known Z position. Make sure \
             that the Z position is correct before cutting. ({})",
            cause
        ),
        HardwareFault::PositionUnavailable { reason } => {
            format!("The stage position could not be read ({}). Check the microtome.", reason)
        }
        HardwareFault::Device { code, cause } => {
            format!("error:{} - {} ({})", code, decode_error(*code), cause)
        }
    }
}
