//! Fractional-bit I/O
//!
//! Codes are packed least-significant-bit first into an integer accumulator.
//! The writer appends a code at the high end of the pending bits and flushes
//! whole bytes from the low end; the reader refills from the low end and
//! shifts right as codes are extracted.  Both sides keep a running MD5 of
//! every byte they move, since the archive header records the digest of the
//! compressed stream exactly as it appears on disk.

use std::io::{Read,Write,ErrorKind};

/// Packs variable-width codes into bytes.
/// Tracks the count and MD5 digest of the bytes written so far.
pub struct BitWriter<W: Write> {
    out: W,
    buff: u64,
    pending: u32,
    count: u64,
    hash: md5::Context
}

/// Extracts variable-width codes from a byte region of known length.
/// Tracks the MD5 digest of the bytes consumed, and raises a terminal
/// flag when the region is exhausted.
pub struct BitReader<R: Read> {
    inp: R,
    buff: u64,
    avail: i32,
    remaining: u64,
    eof: bool,
    hash: md5::Context
}

impl<W: Write> BitWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            buff: 0,
            pending: 0,
            count: 0,
            hash: md5::Context::new()
        }
    }
    fn emit_byte(&mut self,byte: u8) -> Result<(),std::io::Error> {
        self.out.write_all(&[byte])?;
        self.hash.consume([byte]);
        self.count += 1;
        Ok(())
    }
    /// Append `width` bits of `code` and flush any whole bytes.
    pub fn put_code(&mut self,code: u32,width: u32) -> Result<(),std::io::Error> {
        self.buff |= (code as u64) << self.pending;
        self.pending += width;
        while self.pending >= 8 {
            let byte = (self.buff & 0xff) as u8;
            self.emit_byte(byte)?;
            self.buff >>= 8;
            self.pending -= 8;
        }
        Ok(())
    }
    /// Write the closing byte (whatever is left in the accumulator, even if
    /// that is nothing), flush the sink, and return `(count,digest)`.
    pub fn finish(mut self) -> Result<(u64,[u8;16]),std::io::Error> {
        let byte = (self.buff & 0xff) as u8;
        self.emit_byte(byte)?;
        self.out.flush()?;
        Ok((self.count,self.hash.compute().0))
    }
}

impl<R: Read> BitReader<R> {
    /// `len` is the byte length of the compressed region; the reader will
    /// never consume more than `len` bytes from `inp`.
    pub fn new(inp: R,len: u64) -> Self {
        Self {
            inp,
            buff: 0,
            avail: 0,
            remaining: len,
            eof: false,
            hash: md5::Context::new()
        }
    }
    /// Extract the next `width` bits, refilling from the stream as needed.
    /// If the last byte of the region (or the end of the underlying stream)
    /// is reached during the refill, the terminal flag is raised after that
    /// byte and the code is extracted from whatever bits are available.
    pub fn get_code(&mut self,width: u32) -> Result<u32,std::io::Error> {
        let mut byte: [u8;1] = [0];
        while self.avail < width as i32 {
            if self.remaining == 0 {
                self.eof = true;
                break;
            }
            match self.inp.read_exact(&mut byte) {
                Ok(()) => {
                    self.remaining -= 1;
                    self.hash.consume(byte);
                    self.buff |= (byte[0] as u64) << self.avail;
                    self.avail += 8;
                    if self.remaining == 0 {
                        self.eof = true;
                        break;
                    }
                },
                Err(e) if e.kind()==ErrorKind::UnexpectedEof => {
                    // truncated region; terminal, the hash check will fail
                    self.eof = true;
                    break;
                },
                Err(e) => return Err(e)
            }
        }
        let code = (self.buff & ((1u64 << width) - 1)) as u32;
        self.buff >>= width;
        self.avail -= width as i32;
        Ok(code)
    }
    /// True once the region has been fully consumed.
    pub fn reached_end(&self) -> bool {
        self.eof
    }
    pub fn finish(self) -> [u8;16] {
        self.hash.compute().0
    }
}

// *************** TESTS *****************

#[test]
fn writer_packs_lsb_first() {
    let mut out: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut out);
    writer.put_code(65,9).expect("write err");
    writer.put_code(66,9).expect("write err");
    let (count,_hash) = writer.finish().expect("write err");
    // 65 | 66<<9 = 0x8441, low bytes first, then the closing byte with the
    // two leftover (zero) bits
    assert_eq!(out,vec![0x41,0x84,0x00]);
    assert_eq!(count,3);
}

#[test]
fn reader_mirrors_writer() {
    let mut out: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut out);
    for code in [65u32,256,511,300] {
        writer.put_code(code,9).expect("write err");
    }
    let (count,w_hash) = writer.finish().expect("write err");
    assert_eq!(count,out.len() as u64);
    let mut reader = BitReader::new(out.as_slice(),count);
    for expected in [65u32,256,511] {
        assert_eq!(reader.get_code(9).expect("read err"),expected);
        assert!(!reader.reached_end());
    }
    assert_eq!(reader.get_code(9).expect("read err"),300);
    assert!(reader.reached_end());
    assert_eq!(reader.finish(),w_hash);
}

#[test]
fn reader_terminates_on_short_region() {
    // region claims 2 bytes but asks for 3 codes
    let data = [0xff,0x01];
    let mut reader = BitReader::new(data.as_slice(),2);
    assert_eq!(reader.get_code(9).expect("read err"),0x1ff);
    assert!(reader.reached_end());
}

#[test]
fn reader_treats_empty_region_as_terminal() {
    let data: [u8;0] = [];
    let mut reader = BitReader::new(data.as_slice(),0);
    assert_eq!(reader.get_code(9).expect("read err"),0);
    assert!(reader.reached_end());
}

#[test]
fn digests_match_the_raw_bytes() {
    let mut out: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut out);
    writer.put_code(0x1a5,9).expect("write err");
    writer.put_code(0x0c3,10).expect("write err");
    let (count,w_hash) = writer.finish().expect("write err");
    assert_eq!(w_hash,md5::compute(&out).0);
    let mut reader = BitReader::new(out.as_slice(),count);
    reader.get_code(9).expect("read err");
    reader.get_code(10).expect("read err");
    while !reader.reached_end() {
        reader.get_code(8).expect("read err");
    }
    assert_eq!(reader.finish(),w_hash);
}
