//! LZW Compression
//!
//! Streaming encoder and decoder with adaptive code width.  Codes start at
//! 9 bits and widen as the dictionary grows; the dictionary is frozen (never
//! reset) once the code space `[0,2^16)` is exhausted.  The decoder does not
//! rely on any stop code: it terminates purely on the byte length of the
//! compressed region, which the archive header records as `c_size`.
//!
//! The encoder dictionary maps `(prefix_code,next_byte)` pairs to codes, so
//! lookups stay O(1) without concatenating strings.  The decoder stores each
//! code as a link to its parent plus the appended byte, and emits by walking
//! the parent chain.

use std::io::{Cursor,Read,Write,BufReader,BufWriter,ErrorKind};
use std::collections::HashMap;
use crate::bits::{BitReader,BitWriter};
use crate::DYNERR;

/// First code past the end of the code space; no insert happens at or
/// beyond this value.
const MAX_CODE: u32 = 1 << 16;

/// Smallest width able to represent `val`.
fn bit_length(val: u32) -> u32 {
    u32::BITS - val.leading_zeros()
}

/// Dictionary element used by the decoder.  A code's byte-sequence is its
/// parent's sequence with `last` appended; `first` caches the head of the
/// sequence so the classic unknown-code case needs no walk.
struct Link {
    parent: u32,
    last: u8,
    first: u8
}

/// Decoder-side dictionary.  Codes below 256 are the implicit single-byte
/// roots; anything else lives in the map.  A sparse map (rather than a
/// dense table) is required because a damaged stream may define entries at
/// arbitrary codes, and decoding must still run to the end of the region so
/// the checksum can pass judgement.
struct Strings {
    links: HashMap<u32,Link>
}

impl Strings {
    fn new() -> Self {
        Self { links: HashMap::new() }
    }
    fn contains(&self,code: u32) -> bool {
        code < 256 || self.links.contains_key(&code)
    }
    /// Head byte of the sequence for a known code.
    fn first(&self,code: u32) -> u8 {
        match code < 256 {
            true => code as u8,
            false => self.links.get(&code).expect("unseeded code").first
        }
    }
    /// Walk back through the concatenation sequence to form the string and
    /// write it out.
    fn emit<W: Write>(&self,code: u32,writer: &mut W) -> Result<(),DYNERR> {
        let mut rev: Vec<u8> = Vec::new();
        let mut curs = code;
        while curs >= 256 {
            let link = match self.links.get(&curs) {
                Some(l) => l,
                None => return Err(Box::new(crate::Error::BadCode))
            };
            rev.push(link.last);
            curs = link.parent;
        }
        rev.push(curs as u8);
        rev.reverse();
        writer.write_all(&rev)?;
        Ok(())
    }
}

/// Main compression function.
/// `expanded_in` is an object with the `Read` trait, usually `std::fs::File`,
/// or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with the `Write` trait; when packing an
/// archive this is the archive descriptor positioned just past the reserved
/// header slot.
/// Returns `(c_size,hash)`: the number of compressed bytes written and the
/// MD5 digest over exactly those bytes.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W) -> Result<(u64,[u8;16]),DYNERR>
where R: Read, W: Write {
    let mut reader = BufReader::new(expanded_in);
    let mut coder = BitWriter::new(BufWriter::new(compressed_out));
    let mut codes: HashMap<(u32,u8),u32> = HashMap::new();
    let mut code_size: u32 = 9;
    let mut next_code: u32 = 256;
    let mut current: Option<u32> = None;
    let mut sym_in: [u8;1] = [0];

    log::debug!("entering encoder loop");
    loop {
        match reader.read_exact(&mut sym_in) {
            Ok(()) => {
                let sym = sym_in[0];
                current = match current {
                    // a single byte is always its own code
                    None => Some(sym as u32),
                    Some(prefix) => match codes.get(&(prefix,sym)) {
                        Some(code) => Some(*code),
                        None => {
                            coder.put_code(prefix,code_size)?;
                            if next_code < MAX_CODE {
                                codes.insert((prefix,sym),next_code);
                                next_code += 1;
                                code_size = bit_length(next_code);
                            }
                            Some(sym as u32)
                        }
                    }
                };
            },
            Err(e) if e.kind()==ErrorKind::UnexpectedEof => {
                if let Some(prefix) = current {
                    coder.put_code(prefix,code_size)?;
                }
                let (count,hash) = coder.finish()?;
                log::debug!("encoded stream has {} bytes",count);
                return Ok((count,hash));
            },
            Err(e) => return Err(Box::new(e))
        }
    }
}

/// Main decompression function.
/// `compressed_in` is an object with the `Read` trait, usually the archive
/// descriptor positioned at the start of a payload; exactly `c_size` bytes
/// are consumed from it in the ordinary case, never more.
/// `expanded_out` is an object with the `Write` trait.
/// Returns the MD5 digest over the compressed bytes actually consumed; the
/// caller compares it against the stored digest.  An unknown code that
/// cannot be inferred is reported as `Error::BadCode`.
pub fn expand<R,W>(compressed_in: &mut R, expanded_out: &mut W, c_size: u64) -> Result<[u8;16],DYNERR>
where R: Read, W: Write {
    let mut decoder = BitReader::new(compressed_in,c_size);
    let mut writer = BufWriter::new(expanded_out);
    let mut strings = Strings::new();
    let mut code_size: u32 = 9;
    let mut next_code: u32 = 256;
    let mut prev: Option<u32> = None;

    log::debug!("entering decoder loop over {} bytes",c_size);
    loop {
        let code = decoder.get_code(code_size)?;
        if decoder.reached_end() {
            // the last code of a stream always lands on the closing byte;
            // a trailing zero is padding and is not emitted
            if code != 0 {
                strings.emit(code,&mut writer)?;
            }
            writer.flush()?;
            return Ok(decoder.finish());
        }
        if !strings.contains(code) {
            // the code about to be defined was used immediately: its string
            // is the previous string extended by its own first byte
            let prev_code = match prev {
                Some(p) => p,
                None => return Err(Box::new(crate::Error::BadCode))
            };
            let head = strings.first(prev_code);
            strings.links.insert(code,Link { parent: prev_code, last: head, first: head });
            log::trace!("infer {} from {}",code,prev_code);
        }
        strings.emit(code,&mut writer)?;
        if let Some(prev_code) = prev {
            if next_code < MAX_CODE {
                let link = Link {
                    parent: prev_code,
                    last: strings.first(code),
                    first: strings.first(prev_code)
                };
                strings.links.insert(next_code,link);
                next_code += 1;
                code_size = bit_length(next_code + 1);
            }
        }
        prev = Some(code);
    }
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8]) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    compress(&mut src,&mut ans)?;
    Ok(ans.into_inner())
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8]) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    expand(&mut src,&mut ans,slice.len() as u64)?;
    Ok(ans.into_inner())
}

// *************** TESTS *****************

#[cfg(test)]
fn random_payload(min: usize,max: usize) -> Vec<u8> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(min..=max);
    let mut data = vec![0u8;len];
    rng.fill(&mut data[..]);
    data
}

#[test]
fn compression_works() {
    // codes 65 66 67 256 258 257 at 9 bits, plus the closing byte
    let test_data = "ABCABCABC".as_bytes();
    let lzw_str = "41 84 0C 01 28 30 20";
    let compressed = compress_slice(test_data).expect("compression failed");
    assert_eq!(compressed,hex::decode(lzw_str.replace(" ","")).unwrap());
}

#[test]
fn compression_works_repeats() {
    // codes 65 256 65 at 9 bits; 256 is consumed before the decoder has
    // defined it, exercising the inference rule
    let test_data = "AAAA".as_bytes();
    let lzw_str = "41 00 06 01";
    let compressed = compress_slice(test_data).expect("compression failed");
    assert_eq!(compressed,hex::decode(lzw_str.replace(" ","")).unwrap());
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);
}

#[test]
fn invertibility_empty() {
    let compressed = compress_slice(&[]).expect("compression failed");
    assert_eq!(compressed,vec![0u8]);
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded.len(),0);
}

#[test]
fn invertibility_small_random() {
    let test_data = random_payload(512,1024);
    let compressed = compress_slice(&test_data).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn invertibility_medium_random() {
    // large enough to fill the dictionary and freeze the width
    let test_data = random_payload(1<<20,1<<21);
    let compressed = compress_slice(&test_data).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
#[ignore = "tens of MB through the codec, slow without optimization"]
fn invertibility_large_random() {
    let test_data = random_payload(1<<24,1<<25);
    let compressed = compress_slice(&test_data).expect("compression failed");
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn digests_agree() {
    let test_data = random_payload(2048,4096);
    let mut src = Cursor::new(&test_data);
    let mut compressed: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    let (c_size,c_hash) = compress(&mut src,&mut compressed).expect("compression failed");
    let compressed = compressed.into_inner();
    assert_eq!(c_size,compressed.len() as u64);
    assert_eq!(c_hash,md5::compute(&compressed).0);
    let mut src = Cursor::new(&compressed);
    let mut expanded: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    let x_hash = expand(&mut src,&mut expanded,c_size).expect("expansion failed");
    assert_eq!(c_hash,x_hash);
    assert_eq!(test_data,expanded.into_inner());
}

#[test]
fn first_code_must_be_a_root() {
    // first 9 bits decode to 256, which nothing can define
    let bad = [0x00,0x01,0x00];
    match expand_slice(&bad) {
        Err(e) => assert!(e.downcast_ref::<crate::Error>().is_some()),
        Ok(_) => panic!("expansion should have failed")
    }
}
