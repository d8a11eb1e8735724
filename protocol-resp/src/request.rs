//! Client-side request encoding.
//!
//! Every command travels as a RESP array of bulk strings, so arbitrary
//! bytes (including CR, LF and non-UTF-8 data) survive the trip unchanged.

/// A borrowed request builder.
///
/// # Example
///
/// ```
/// use protocol_resp::Request;
///
/// let mut buf = Vec::new();
/// Request::cmd(b"CLUSTER").arg(b"SLOTS").encode(&mut buf);
/// assert_eq!(buf, b"*2\r\n$7\r\nCLUSTER\r\n$5\r\nSLOTS\r\n");
/// ```
#[derive(Debug, Clone)]
pub struct Request<'a> {
    args: Vec<&'a [u8]>,
}

impl<'a> Request<'a> {
    /// Start a request with the command name.
    #[inline]
    pub fn cmd(name: &'a [u8]) -> Self {
        Self { args: vec![name] }
    }

    /// Append an argument.
    #[inline]
    pub fn arg(mut self, arg: &'a [u8]) -> Self {
        self.args.push(arg);
        self
    }

    /// `PING`
    #[inline]
    pub fn ping() -> Self {
        Self::cmd(b"PING")
    }

    /// `CLUSTER SLOTS`, the topology discovery query.
    #[inline]
    pub fn cluster_slots() -> Self {
        Self::cmd(b"CLUSTER").arg(b"SLOTS")
    }

    /// `ASKING`, sent before a command redirected by `-ASK`.
    #[inline]
    pub fn asking() -> Self {
        Self::cmd(b"ASKING")
    }

    /// `MULTI`, opening a transaction.
    #[inline]
    pub fn multi() -> Self {
        Self::cmd(b"MULTI")
    }

    /// `EXEC`, committing a transaction.
    #[inline]
    pub fn exec() -> Self {
        Self::cmd(b"EXEC")
    }

    /// The arguments, command name first.
    pub fn args(&self) -> &[&'a [u8]] {
        &self.args
    }

    /// Append the encoded request to `buf`.
    #[inline]
    pub fn encode(&self, buf: &mut Vec<u8>) {
        encode_command(buf, &self.args);
    }

    /// Exact encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        encoded_len(&self.args)
    }
}

/// Append `args` to `buf` as one RESP array of bulk strings.
pub fn encode_command<A: AsRef<[u8]>>(buf: &mut Vec<u8>, args: &[A]) {
    buf.reserve(encoded_len(args));
    let mut text = itoa::Buffer::new();
    buf.push(b'*');
    buf.extend_from_slice(text.format(args.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");
    for arg in args {
        let arg = arg.as_ref();
        buf.push(b'$');
        buf.extend_from_slice(text.format(arg.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
}

/// Exact size of `args` once encoded by [`encode_command`].
pub fn encoded_len<A: AsRef<[u8]>>(args: &[A]) -> usize {
    let mut text = itoa::Buffer::new();
    // *<count>\r\n
    let mut len = 1 + text.format(args.len()).len() + 2;
    for arg in args {
        let arg = arg.as_ref();
        // $<len>\r\n<data>\r\n
        len += 1 + text.format(arg.len()).len() + 2 + arg.len() + 2;
    }
    len
}
