//! # Alphapack
//!
//! The byte layout spoken between alpha clients and providers.
//!
//! ## Layout
//!
//! - **Scalars**: `[Tag: 1b][Data: N]`
//! - **Strings**: `[Tag: 1b][Len: 4b][UTF-8: Len]`
//! - **Containers**: `[Tag: 1b][Len: 4b][Body: Len]`
//!
//! Integers are little-endian. Every container carries its body length up
//! front, so a reader can always step over an item it does not understand.
//!
//! The encoder is a small state machine: it keeps a stack of open containers,
//! refuses writes that would leave a container malformed, and back-patches the
//! length header when the container is closed.

#[cfg(test)]
mod tests;

/// Encoding and decoding failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Byte is not a known `Tag`.
    InvalidTag(u8),
    /// A different tag was found where a specific one was required.
    UnexpectedTag { expected: Tag, found: Tag },
    /// String payload is not UTF-8.
    InvalidUtf8,
    /// Closed a container that is not the innermost open one.
    ScopeMismatch { expected: Scope, actual: Scope },
    /// Closed a container while only the root was open.
    ScopeUnderflow,
    /// Finalized the buffer with containers still open.
    ScopeStillOpen,
    /// Ran out of bytes while reading.
    UnexpectedEnd,
    /// A string or container body does not fit a `u32` length.
    TooLarge(usize),
    /// Wrote a second item into a single-item container.
    TooManyItems(Scope),
    /// Closed a single-item container without writing its item.
    EmptyScope(Scope),
    /// Wrote something other than a variant directly into a map.
    InvalidMapEntry,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidTag(b) => write!(f, "invalid tag byte {:#04x}", b),
            Error::UnexpectedTag { expected, found } => {
                write!(f, "expected {:?}, found {:?}", expected, found)
            }
            Error::ScopeMismatch { expected, actual } => {
                write!(f, "scope mismatch: closing {:?} while {:?} is open", expected, actual)
            }
            Error::TooManyItems(s) => write!(f, "{:?} holds exactly one item", s),
            Error::EmptyScope(s) => write!(f, "{:?} closed without its item", s),
            Error::TooLarge(n) => write!(f, "{} bytes exceed the u32 length header", n),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Leading byte of every encoded item.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    True = 0x01,
    False = 0x02,
    U16 = 0x04,
    U32 = 0x05,
    U64 = 0x06,
    S32 = 0x09,
    Unit = 0x0E,

    String = 0x10,

    List = 0x20,
    Map = 0x21,

    Ok = 0x31,
    Err = 0x32,
    Variant = 0x33,
}

impl Tag {
    pub fn from_u8(b: u8) -> Option<Self> {
        let tag = match b {
            0x01 => Tag::True,
            0x02 => Tag::False,
            0x04 => Tag::U16,
            0x05 => Tag::U32,
            0x06 => Tag::U64,
            0x09 => Tag::S32,
            0x0E => Tag::Unit,
            0x10 => Tag::String,
            0x20 => Tag::List,
            0x21 => Tag::Map,
            0x31 => Tag::Ok,
            0x32 => Tag::Err,
            0x33 => Tag::Variant,
            _ => return None,
        };
        Some(tag)
    }

    /// Width of the fixed payload following the tag, `None` for length-prefixed items.
    fn fixed_width(self) -> Option<usize> {
        match self {
            Tag::True | Tag::False | Tag::Unit => Some(0),
            Tag::U16 => Some(2),
            Tag::U32 | Tag::S32 => Some(4),
            Tag::U64 => Some(8),
            Tag::String | Tag::List | Tag::Map | Tag::Ok | Tag::Err | Tag::Variant => None,
        }
    }
}

/// Kind of container open on the encoder stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Top level; any number of items.
    Root,
    /// Any number of items.
    List,
    /// Only variants (`key => value`) are allowed.
    Map,
    /// Exactly one item.
    Result,
    /// Exactly one payload item after the name.
    Variant,
}

struct Open {
    body_start: usize,
    scope: Scope,
    items: usize,
}

/// Writes items into a growable buffer, validating container structure as it goes.
pub struct Encoder {
    buf: Vec<u8>,
    open: Vec<Open>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
            open: vec![Open { body_start: 0, scope: Scope::Root, items: 0 }],
        }
    }

    /// Returns the encoded bytes.
    ///
    /// # Errors
    /// `Error::ScopeStillOpen` if any container was left open.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        if self.open.len() > 1 {
            return Err(Error::ScopeStillOpen);
        }
        Ok(self.buf)
    }

    fn innermost(&mut self) -> &mut Open {
        let last = self.open.len() - 1;
        &mut self.open[last]
    }

    fn admit(&mut self, tag: Tag) -> Result<()> {
        let open = self.innermost();
        match open.scope {
            Scope::Root | Scope::List => Ok(()),
            Scope::Map if tag == Tag::Variant => Ok(()),
            Scope::Map => Err(Error::InvalidMapEntry),
            Scope::Result | Scope::Variant if open.items >= 1 => Err(Error::TooManyItems(open.scope)),
            Scope::Result | Scope::Variant => Ok(()),
        }
    }

    fn scalar(&mut self, tag: Tag, payload: &[u8]) -> Result<()> {
        self.admit(tag)?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(payload);
        self.innermost().items += 1;
        Ok(())
    }

    fn begin(&mut self, tag: Tag, scope: Scope) -> Result<()> {
        self.admit(tag)?;
        self.buf.push(tag as u8);
        self.buf.extend_from_slice(&[0; 4]);
        self.open.push(Open { body_start: self.buf.len(), scope, items: 0 });
        Ok(())
    }

    fn end(&mut self, expected: Scope) -> Result<()> {
        if self.open.len() <= 1 {
            return Err(Error::ScopeUnderflow);
        }
        let open = self.innermost();
        if open.scope != expected {
            return Err(Error::ScopeMismatch { expected, actual: open.scope });
        }
        if matches!(open.scope, Scope::Result | Scope::Variant) && open.items == 0 {
            return Err(Error::EmptyScope(open.scope));
        }

        let body_start = open.body_start;
        self.open.pop();

        let body_len = self.buf.len() - body_start;
        let len = u32::try_from(body_len).map_err(|_| Error::TooLarge(body_len))?;
        self.buf[body_start - 4..body_start].copy_from_slice(&len.to_le_bytes());

        self.innermost().items += 1;
        Ok(())
    }

    pub fn bool(&mut self, v: bool) -> Result<()> {
        self.scalar(if v { Tag::True } else { Tag::False }, &[])
    }

    pub fn u16(&mut self, v: u16) -> Result<()> { self.scalar(Tag::U16, &v.to_le_bytes()) }
    pub fn u32(&mut self, v: u32) -> Result<()> { self.scalar(Tag::U32, &v.to_le_bytes()) }
    pub fn u64(&mut self, v: u64) -> Result<()> { self.scalar(Tag::U64, &v.to_le_bytes()) }
    pub fn s32(&mut self, v: i32) -> Result<()> { self.scalar(Tag::S32, &v.to_le_bytes()) }
    pub fn unit(&mut self) -> Result<()> { self.scalar(Tag::Unit, &[]) }

    pub fn str(&mut self, v: &str) -> Result<()> {
        let len = u32::try_from(v.len()).map_err(|_| Error::TooLarge(v.len()))?;
        self.admit(Tag::String)?;
        self.buf.push(Tag::String as u8);
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(v.as_bytes());
        self.innermost().items += 1;
        Ok(())
    }

    /// Opens a list. Close with `list_end`.
    pub fn list_begin(&mut self) -> Result<()> { self.begin(Tag::List, Scope::List) }
    pub fn list_end(&mut self) -> Result<()> { self.end(Scope::List) }

    /// Opens a map. Only `variant_begin` may write directly into it.
    pub fn map_begin(&mut self) -> Result<()> { self.begin(Tag::Map, Scope::Map) }
    pub fn map_end(&mut self) -> Result<()> { self.end(Scope::Map) }

    /// Opens the success arm of a result. Exactly one item must follow.
    pub fn ok_begin(&mut self) -> Result<()> { self.begin(Tag::Ok, Scope::Result) }
    pub fn ok_end(&mut self) -> Result<()> { self.end(Scope::Result) }

    /// Opens the failure arm of a result. Exactly one item must follow.
    pub fn err_begin(&mut self) -> Result<()> { self.begin(Tag::Err, Scope::Result) }
    pub fn err_end(&mut self) -> Result<()> { self.end(Scope::Result) }

    /// Opens a named variant. The name is written immediately and exactly one
    /// payload item must follow before `variant_end`.
    pub fn variant_begin(&mut self, name: &str) -> Result<()> {
        self.begin(Tag::Variant, Scope::Variant)?;
        self.str(name)?;
        self.innermost().items = 0;
        Ok(())
    }
    pub fn variant_end(&mut self) -> Result<()> { self.end(Scope::Variant) }
}

/// A zero-copy cursor over encoded bytes.
///
/// Container reads hand back a new `Decoder` restricted to the container body.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn peek_tag(&self) -> Result<Tag> {
        let first = *self.buf.first().ok_or(Error::UnexpectedEnd)?;
        Tag::from_u8(first).ok_or(Error::InvalidTag(first))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.buf.len() {
            return Err(Error::UnexpectedEnd);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn expect(&mut self, expected: Tag) -> Result<()> {
        let found = self.peek_tag()?;
        if found != expected {
            return Err(Error::UnexpectedTag { expected, found });
        }
        self.take(1)?;
        Ok(())
    }

    fn length(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.take_array()?) as usize)
    }

    /// Steps over the next item, including everything nested inside it.
    pub fn skip(&mut self) -> Result<()> {
        let tag = self.peek_tag()?;
        self.take(1)?;
        let width = match tag.fixed_width() {
            Some(width) => width,
            None => self.length()?,
        };
        self.take(width)?;
        Ok(())
    }

    pub fn bool(&mut self) -> Result<bool> {
        match self.peek_tag()? {
            Tag::True => { self.take(1)?; Ok(true) }
            Tag::False => { self.take(1)?; Ok(false) }
            found => Err(Error::UnexpectedTag { expected: Tag::True, found }),
        }
    }

    pub fn u16(&mut self) -> Result<u16> { self.expect(Tag::U16)?; Ok(u16::from_le_bytes(self.take_array()?)) }
    pub fn u32(&mut self) -> Result<u32> { self.expect(Tag::U32)?; Ok(u32::from_le_bytes(self.take_array()?)) }
    pub fn u64(&mut self) -> Result<u64> { self.expect(Tag::U64)?; Ok(u64::from_le_bytes(self.take_array()?)) }
    pub fn s32(&mut self) -> Result<i32> { self.expect(Tag::S32)?; Ok(i32::from_le_bytes(self.take_array()?)) }
    pub fn unit(&mut self) -> Result<()> { self.expect(Tag::Unit) }

    pub fn str(&mut self) -> Result<&'a str> {
        self.expect(Tag::String)?;
        let len = self.length()?;
        std::str::from_utf8(self.take(len)?).map_err(|_| Error::InvalidUtf8)
    }

    fn enter(&mut self, tag: Tag) -> Result<Decoder<'a>> {
        self.expect(tag)?;
        let len = self.length()?;
        Ok(Decoder::new(self.take(len)?))
    }

    pub fn list(&mut self) -> Result<ListIter<'a>> {
        Ok(ListIter { dec: self.enter(Tag::List)? })
    }

    pub fn map(&mut self) -> Result<MapIter<'a>> {
        Ok(MapIter { dec: self.enter(Tag::Map)? })
    }

    /// Returns the payload decoder of whichever result arm is present.
    pub fn result(&mut self) -> Result<std::result::Result<Decoder<'a>, Decoder<'a>>> {
        match self.peek_tag()? {
            Tag::Ok => Ok(Ok(self.enter(Tag::Ok)?)),
            Tag::Err => Ok(Err(self.enter(Tag::Err)?)),
            found => Err(Error::UnexpectedTag { expected: Tag::Ok, found }),
        }
    }

    /// Returns `(name, payload)`.
    pub fn variant(&mut self) -> Result<(&'a str, Decoder<'a>)> {
        let mut body = self.enter(Tag::Variant)?;
        let name = body.str()?;
        Ok((name, body))
    }
}

/// Items of a list, each as its own `Decoder`.
#[derive(Debug)]
pub struct ListIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> ListIter<'a> {
    /// Returns the next item, or `None` at the end of the list.
    ///
    /// # Errors
    /// Fails if the next item is truncated or carries an unknown tag.
    pub fn next(&mut self) -> Result<Option<Decoder<'a>>> {
        if self.dec.remaining() == 0 {
            return Ok(None);
        }
        let mut probe = self.dec.clone();
        probe.skip()?;
        let len = self.dec.remaining() - probe.remaining();
        Ok(Some(Decoder::new(self.dec.take(len)?)))
    }
}

/// Entries of a map as `(key, value)` pairs.
#[derive(Debug)]
pub struct MapIter<'a> {
    dec: Decoder<'a>,
}

impl<'a> MapIter<'a> {
    pub fn next(&mut self) -> Result<Option<(&'a str, Decoder<'a>)>> {
        if self.dec.remaining() == 0 {
            return Ok(None);
        }
        Ok(Some(self.dec.variant()?))
    }
}
