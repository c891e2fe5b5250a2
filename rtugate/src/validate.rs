//! Response validation strategies
//!
//! A validator decides whether a well-formed response PDU actually answers
//! the request PDU it was paired with. Validators are chosen per function
//! code; a rejection surfaces as [`Status::ContextMismatch`].
//!
//! [`Status::ContextMismatch`]: rtugate_core::Status::ContextMismatch

use std::collections::HashMap;
use std::fmt;

use rtugate_core::FunctionCode;

use crate::error::{Error, Result};

/// Check a response PDU against its request PDU
pub trait ResponseValidator: Send + Sync {
    /// Return a reason when `response` does not answer `request`
    fn validate(&self, request: &[u8], response: &[u8]) -> std::result::Result<(), String>;
}

/// Accept any response
#[derive(Debug, Clone, Copy, Default)]
pub struct Accept;

impl ResponseValidator for Accept {
    fn validate(&self, _request: &[u8], _response: &[u8]) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Response function code must echo the request's
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchFunction;

impl ResponseValidator for MatchFunction {
    fn validate(&self, request: &[u8], response: &[u8]) -> std::result::Result<(), String> {
        match (request.first(), response.first()) {
            (Some(sent), Some(got)) if sent == got => Ok(()),
            (sent, got) => Err(format!(
                "function {:02X?} answered by {:02X?}",
                sent, got
            )),
        }
    }
}

/// Read response byte count must fit the requested quantity
///
/// Bit reads carry `ceil(q / 8)` bytes, register reads `2 * q`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteCount;

impl ResponseValidator for ByteCount {
    fn validate(&self, request: &[u8], response: &[u8]) -> std::result::Result<(), String> {
        MatchFunction.validate(request, response)?;

        if request.len() < 5 || response.len() < 2 {
            return Err("read request or response truncated".to_string());
        }

        let quantity = u16::from_be_bytes([request[3], request[4]]) as usize;
        let expected = match request[0] {
            0x01 | 0x02 => quantity.div_ceil(8),
            _ => quantity * 2,
        };

        let declared = response[1] as usize;
        let carried = response.len() - 2;
        if declared != expected || carried != expected {
            return Err(format!(
                "byte count {} (carrying {}) for {} requested bytes",
                declared, carried, expected
            ));
        }
        Ok(())
    }
}

/// Write response must echo the request's address and value or quantity
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoRequest;

impl ResponseValidator for EchoRequest {
    fn validate(&self, request: &[u8], response: &[u8]) -> std::result::Result<(), String> {
        MatchFunction.validate(request, response)?;

        match (request.get(1..5), response.get(1..5)) {
            (Some(sent), Some(got)) if sent == got => Ok(()),
            (sent, got) => Err(format!("write echo {:02X?} for {:02X?}", got, sent)),
        }
    }
}

/// Validator registry keyed by function code
pub struct Validators {
    fallback: Box<dyn ResponseValidator>,
    by_function: HashMap<u8, Box<dyn ResponseValidator>>,
}

impl Validators {
    /// Accept every response
    pub fn permissive() -> Self {
        Self {
            fallback: Box::new(Accept),
            by_function: HashMap::new(),
        }
    }

    /// Check function echo, read byte counts and write echoes
    pub fn strict() -> Self {
        use FunctionCode::*;

        let mut validators = Self {
            fallback: Box::new(MatchFunction),
            by_function: HashMap::new(),
        };
        for function in [ReadCoils, ReadDiscreteInputs, ReadHoldingRegisters, ReadInputRegisters] {
            validators = validators.with(function, ByteCount);
        }
        for function in [
            WriteSingleCoil,
            WriteSingleRegister,
            WriteMultipleCoils,
            WriteMultipleRegisters,
        ] {
            validators = validators.with(function, EchoRequest);
        }
        validators
    }

    /// Use `validator` for responses to `function`
    pub fn with(mut self, function: FunctionCode, validator: impl ResponseValidator + 'static) -> Self {
        self.by_function.insert(function.into(), Box::new(validator));
        self
    }

    /// Validator used for function codes without their own
    pub fn with_fallback(mut self, validator: impl ResponseValidator + 'static) -> Self {
        self.fallback = Box::new(validator);
        self
    }

    /// Validate `response` against `request`
    pub fn check(&self, request: &[u8], response: &[u8]) -> Result<()> {
        let validator = request
            .first()
            .and_then(|function| self.by_function.get(function))
            .unwrap_or(&self.fallback);

        validator
            .validate(request, response)
            .map_err(Error::ContextMismatch)
    }
}

impl Default for Validators {
    fn default() -> Self {
        Self::permissive()
    }
}

impl fmt::Debug for Validators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<_> = self.by_function.keys().copied().collect();
        functions.sort_unstable();
        f.debug_struct("Validators")
            .field("functions", &functions)
            .finish_non_exhaustive()
    }
}
