use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use super::{ErrorCode, Handle};

/// I/O callback result type.
pub type IoResult = Result<(), ErrorCode>;

/// Characteristic or descriptor I/O callback for values that are not static.
#[derive(Clone)]
#[repr(transparent)]
pub struct Io(Arc<dyn for<'a> Fn(IoReq<'a>) -> IoResult + Send + Sync>);

impl Io {
    /// Returns an I/O callback for a method of `T`.
    #[inline(always)]
    pub fn with<T: Send + Sync + 'static>(
        this: &Arc<T>,
        f: impl Fn(&T, IoReq) -> IoResult + Send + Sync + 'static,
    ) -> Self {
        let this = Arc::clone(this);
        Self(Arc::new(move |req: IoReq| f(&this, req)))
    }

    /// Executes the request.
    #[inline(always)]
    pub(crate) fn exec(&self, req: IoReq) -> IoResult {
        (self.0)(req)
    }
}

impl Debug for Io {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_tuple("Io").field(&Arc::as_ptr(&self.0).cast::<()>())).finish()
    }
}

impl<T: Fn(IoReq) -> IoResult + Send + Sync + 'static> From<T> for Io {
    #[inline(always)]
    fn from(f: T) -> Self {
        Self(Arc::new(f))
    }
}

/// Characteristic or descriptor I/O request.
#[derive(Debug)]
#[non_exhaustive]
pub enum IoReq<'a> {
    Read(&'a mut ReadReq),
    Write(&'a WriteReq<'a>),
}

/// Server characteristic or descriptor read request.
#[derive(Debug)]
pub struct ReadReq {
    pub(super) hdl: Handle,
    pub(super) off: u16,
    pub(super) buf: Vec<u8>,
}

impl ReadReq {
    /// Creates a new read request.
    #[inline(always)]
    pub(crate) const fn new(hdl: Handle, off: u16) -> Self {
        Self {
            hdl,
            off,
            buf: Vec::new(),
        }
    }

    /// Returns the attribute handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the value offset.
    #[inline(always)]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.off as _
    }

    /// Provides the complete attribute value with automatic offset handling.
    #[inline]
    pub fn complete(&mut self, v: impl AsRef<[u8]>) -> IoResult {
        let v = (v.as_ref().get(self.offset()..)).ok_or(ErrorCode::InvalidOffset)?;
        self.buf.clear();
        self.buf.extend_from_slice(v);
        Ok(())
    }

    /// Returns the response value.
    #[inline(always)]
    pub(crate) fn into_value(self) -> Vec<u8> {
        self.buf
    }
}

/// Server characteristic or descriptor write request.
#[derive(Debug)]
pub struct WriteReq<'a> {
    pub(super) hdl: Handle,
    pub(super) off: u16,
    pub(super) val: &'a [u8],
}

impl<'a> WriteReq<'a> {
    /// Creates a new write request.
    #[inline(always)]
    pub(crate) const fn new(hdl: Handle, off: u16, val: &'a [u8]) -> Self {
        Self { hdl, off, val }
    }

    /// Returns the attribute handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the value offset.
    #[inline(always)]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.off as _
    }

    /// Returns the value to be written at the specified offset.
    #[inline(always)]
    #[must_use]
    pub const fn value(&self) -> &'a [u8] {
        self.val
    }

    /// Updates `dst` with the written value. Returns either `InvalidOffset` or
    /// `InvalidAttributeValueLength` if the written value is not a subslice of
    /// `dst`.
    #[inline]
    pub fn update(&self, mut dst: impl AsMut<[u8]>) -> IoResult {
        let Some(dst) = dst.as_mut().get_mut(self.offset()..) else {
            return Err(ErrorCode::InvalidOffset);
        };
        let Some(dst) = dst.get_mut(..self.val.len()) else {
            return Err(ErrorCode::InvalidAttributeValueLength);
        };
        dst.copy_from_slice(self.val);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read() {
        let mut r = ReadReq::new(Handle::MIN, 1);
        r.complete([1, 2, 3]).unwrap();
        assert_eq!(r.into_value(), [2, 3]);
        let mut r = ReadReq::new(Handle::MIN, 4);
        assert_eq!(r.complete([1, 2, 3]), Err(ErrorCode::InvalidOffset));
    }

    #[test]
    fn write() {
        let mut v = [0_u8; 2];
        WriteReq::new(Handle::MIN, 1, &[7]).update(&mut v).unwrap();
        assert_eq!(v, [0, 7]);
        assert_eq!(
            WriteReq::new(Handle::MIN, 0, &[1, 2, 3]).update(&mut v),
            Err(ErrorCode::InvalidAttributeValueLength)
        );
        assert_eq!(
            WriteReq::new(Handle::MIN, 3, &[]).update(&mut v),
            Err(ErrorCode::InvalidOffset)
        );
    }

    #[test]
    fn io() {
        let io = Io::from(|req: IoReq| match req {
            IoReq::Read(r) => r.complete([0xAA]),
            IoReq::Write(_) => Err(ErrorCode::WriteNotPermitted),
        });
        let mut r = ReadReq::new(Handle::MIN, 0);
        io.exec(IoReq::Read(&mut r)).unwrap();
        assert_eq!(r.into_value(), [0xAA]);
        let w = WriteReq::new(Handle::MIN, 0, &[]);
        assert_eq!(io.exec(IoReq::Write(&w)), Err(ErrorCode::WriteNotPermitted));
    }
}
