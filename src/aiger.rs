use anyhow::{anyhow, ensure, Context, Result};
use num_enum::TryFromPrimitive;

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::aig::equiv::Repr;
use crate::aig::Aig;
use crate::lit::Lit;

/// Extension-section tags following the binary AND block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
enum SectionTag {
    Equiv = b'e',
    Mapping = b'm',
    Packing = b'p',
    Comment = b'c',
}

trait AigerRead: BufRead {
    fn read_u8(&mut self) -> Result<u8> {
        let mut data = [0; 1];
        self.read_exact(&mut data)?;
        Ok(data[0])
    }

    fn peek_u8(&mut self) -> Result<Option<u8>> {
        Ok(self.fill_buf()?.first().copied())
    }

    /// Reads 1 to 5 bytes of the AIGER variable-length code: seven value
    /// bits per byte, low chunk first, top bit marking continuation.
    fn read_unsigned(&mut self) -> Result<u32> {
        let mut value: u32 = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F)
                .checked_shl(shift)
                .ok_or_else(|| anyhow!("Overlong unsigned code"))?;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(anyhow!("Unterminated unsigned code"))
    }

    fn read_text_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.read_line(&mut line)?;
        ensure!(n > 0, "Unexpected EoF in AIGER header lines");
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }
}
impl<R: BufRead> AigerRead for R {}

fn write_unsigned(out: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        out.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_unsigned_slice(pos: &mut &[u8]) -> Result<u32> {
    let mut cursor = *pos;
    let value = (&mut cursor).read_unsigned()?;
    *pos = cursor;
    Ok(value)
}

/// Reads a binary AIGER file. Gzip- and zlib-compressed inputs are
/// recognized by their leading bytes and decompressed transparently.
pub fn read_aiger(path: impl AsRef<Path>) -> Result<Aig> {
    let path = path.as_ref();
    let mut input = BufReader::new(
        File::open(path).with_context(|| format!("Opening {}", path.display()))?,
    );
    let mut magic = [0u8; 2];
    let head = input.fill_buf()?;
    magic[..head.len().min(2)].copy_from_slice(&head[..head.len().min(2)]);
    let aig = match magic {
        [0x1F, 0x8B] => {
            read_aiger_from(BufReader::new(flate2::bufread::GzDecoder::new(input)))
        }
        [0x78, 0x01 | 0x5E | 0x9C | 0xDA] => {
            read_aiger_from(BufReader::new(flate2::bufread::ZlibDecoder::new(input)))
        }
        _ => read_aiger_from(input),
    };
    aig.with_context(|| format!("Reading AIGER file {}", path.display()))
}

/// Reads a binary AIGER stream into a fresh manager.
pub fn read_aiger_from(mut input: impl BufRead) -> Result<Aig> {
    let header = input.read_text_line()?;
    let fields: Vec<&str> = header.split_ascii_whitespace().collect();
    ensure!(
        fields.len() == 6 && fields[0] == "aig",
        "Invalid AIGER header: {header:?}"
    );
    let nums: Vec<usize> = fields[1..]
        .iter()
        .map(|f| f.parse().map_err(|_| anyhow!("Invalid AIGER header number {f:?}")))
        .collect::<Result<_>>()?;
    let (m, i, l, o, a) = (nums[0], nums[1], nums[2], nums[3], nums[4]);
    ensure!(m == i + l + a, "Inconsistent AIGER header: M != I + L + A");

    let mut aig = Aig::start(m + o + 1);
    for _ in 0..i + l {
        aig.append_ci();
    }

    // latch and output driver literals come as text lines before the gates
    let mut latch_lits = Vec::with_capacity(l);
    for _ in 0..l {
        let line = input.read_text_line()?;
        let mut parts = line.split_ascii_whitespace();
        let next: u32 = parts
            .next()
            .ok_or_else(|| anyhow!("Empty latch line"))?
            .parse()
            .map_err(|_| anyhow!("Invalid latch literal: {line:?}"))?;
        if let Some(init) = parts.next() {
            ensure!(init == "0", "Only zero-initialized latches are supported");
        }
        latch_lits.push(next);
    }
    let mut out_lits = Vec::with_capacity(o);
    for _ in 0..o {
        let line = input.read_text_line()?;
        let lit: u32 = line
            .parse()
            .map_err(|_| anyhow!("Invalid output literal: {line:?}"))?;
        out_lits.push(lit);
    }

    // delta-coded AND gates; object ids coincide with AIGER variables
    for n in 0..a {
        let var = i + l + 1 + n;
        let lhs = 2 * var as u64;
        let delta0 = u64::from(input.read_unsigned()?);
        ensure!(delta0 <= lhs, "AND {var} fanin underflow");
        let rhs0 = lhs - delta0;
        let delta1 = u64::from(input.read_unsigned()?);
        ensure!(delta1 <= rhs0, "AND {var} fanin underflow");
        let rhs1 = rhs0 - delta1;
        ensure!(delta0 > 0 && rhs0 != rhs1, "AND {var} has equal fanins");
        let lit = aig.append_and(
            Lit::from_raw(rhs1 as u32),
            Lit::from_raw(rhs0 as u32),
        );
        debug_assert_eq!(lit.var(), var);
    }

    let check_lit = |lit: u32| -> Result<Lit> {
        ensure!((lit >> 1) as usize <= m, "Literal {lit} out of range");
        Ok(Lit::from_raw(lit))
    };
    for lit in out_lits {
        aig.append_co(check_lit(lit)?);
    }
    for lit in latch_lits {
        aig.append_co(check_lit(lit)?);
    }
    aig.set_reg_num(l);

    read_trailing_sections(&mut input, &mut aig)?;
    aig.check_topo_order()?;
    Ok(aig)
}

fn read_trailing_sections(input: &mut impl BufRead, aig: &mut Aig) -> Result<()> {
    loop {
        let Some(byte) = input.peek_u8()? else {
            return Ok(());
        };
        match byte {
            b'i' | b'l' | b'o' => read_symbol_line(input, aig)?,
            _ => match SectionTag::try_from(byte) {
                Ok(SectionTag::Comment) => {
                    // free-form trailer, not interpreted
                    let mut rest = Vec::new();
                    input.read_to_end(&mut rest)?;
                    return Ok(());
                }
                Ok(tag) => {
                    input.read_u8()?;
                    let payload = read_section_payload(input)?;
                    match tag {
                        SectionTag::Equiv => read_equiv_section(&payload, aig)?,
                        SectionTag::Mapping => read_mapping_section(&payload, aig)?,
                        SectionTag::Packing => read_packing_section(&payload, aig)?,
                        SectionTag::Comment => unreachable!(),
                    }
                }
                Err(_) => {
                    #[cfg(feature = "restrictive")]
                    return Err(anyhow!("Unknown AIGER section tag {byte:#04x}"));
                    #[cfg(not(feature = "restrictive"))]
                    return Ok(());
                }
            },
        }
    }
}

fn read_symbol_line(input: &mut impl BufRead, aig: &mut Aig) -> Result<()> {
    let line = input.read_text_line()?;
    let (head, name) = line
        .split_once(' ')
        .ok_or_else(|| anyhow!("Invalid symbol line: {line:?}"))?;
    ensure!(head.len() >= 2, "Invalid symbol line: {line:?}");
    let index: usize = head[1..]
        .parse()
        .map_err(|_| anyhow!("Invalid symbol index: {line:?}"))?;
    let n_cis = aig.cis().len();
    let n_cos = aig.cos().len();
    let n_pis = aig.n_pis();
    let (names, slot, len) = match head.as_bytes()[0] {
        b'i' => (&mut aig.ci_names, index, n_cis),
        b'l' => (&mut aig.ci_names, n_pis + index, n_cis),
        b'o' => (&mut aig.co_names, index, n_cos),
        _ => unreachable!(),
    };
    ensure!(slot < len, "Symbol index out of range: {line:?}");
    names.get_or_insert_with(|| vec![String::new(); len])[slot] = name.to_string();
    Ok(())
}

fn read_section_payload(input: &mut impl BufRead) -> Result<Vec<u8>> {
    let len: u32 = bincode::deserialize_from(&mut *input)?;
    let mut payload = vec![0u8; len as usize];
    input.read_exact(&mut payload)?;
    Ok(payload)
}

/// Equivalence blob: a class is opened by `2 * (repr - prev_repr) + 1`;
/// members follow as `2 * (2 * (node - prev_node) + proved)`. The
/// constant class is emitted first with representative 0.
fn read_equiv_section(payload: &[u8], aig: &mut Aig) -> Result<()> {
    let mut pos = payload;
    let mut reprs = vec![Repr::none(); aig.n_objs()];
    let mut i_repr = 0usize;
    let mut i_node = 0usize;
    while !pos.is_empty() {
        let item = read_unsigned_slice(&mut pos)? as usize;
        if item & 1 != 0 {
            i_repr += item >> 1;
            i_node = i_repr;
            continue;
        }
        let item = item >> 1;
        let proved = item & 1 != 0;
        i_node += item >> 1;
        ensure!(i_repr < i_node, "Equivalence record out of order");
        ensure!(i_node < aig.n_objs(), "Equivalence record out of range");
        reprs[i_node] = Repr::new(i_repr, proved);
    }
    aig.reprs = Some(reprs);
    aig.derive_nexts();
    Ok(())
}

fn write_equiv_section(out: &mut Vec<u8>, aig: &Aig) {
    // constant class
    write_unsigned(out, 1);
    let mut prev_node = 0;
    for id in aig.const_class() {
        let lit = 2 * (id - prev_node) + aig.obj_proved(id) as usize;
        prev_node = id;
        write_unsigned(out, 2 * lit as u32);
    }
    // non-constant classes
    let mut prev_repr = 0;
    let heads: Vec<usize> = aig.class_heads().collect();
    for head in heads {
        write_unsigned(out, (2 * (head - prev_repr) + 1) as u32);
        prev_repr = head;
        let mut prev_node = head;
        for member in aig.class_iter(head).skip(1) {
            let lit = 2 * (member - prev_node) + aig.obj_proved(member) as usize;
            prev_node = member;
            write_unsigned(out, 2 * lit as u32);
        }
    }
}

fn read_diff_value(pos: &mut &[u8], prev: usize) -> Result<usize> {
    let item = read_unsigned_slice(pos)? as usize;
    if item & 1 != 0 {
        Ok(prev + (item >> 1))
    } else {
        prev
            .checked_sub(item >> 1)
            .ok_or_else(|| anyhow!("Mapping record underflow"))
    }
}

fn write_diff_value(out: &mut Vec<u8>, prev: usize, this: usize) {
    if prev < this {
        write_unsigned(out, (2 * (this - prev) + 1) as u32);
    } else {
        write_unsigned(out, (2 * (prev - this)) as u32);
    }
}

/// Mapping blob: LUT records `n_fanins, fanin..., root`, every value a
/// signed difference from the previous one.
fn read_mapping_section(payload: &[u8], aig: &mut Aig) -> Result<()> {
    let mut pos = payload;
    let mut luts = Vec::new();
    let mut prev = 0usize;
    while !pos.is_empty() {
        let n_fanins = read_unsigned_slice(&mut pos)? as usize;
        let mut fanins = Vec::with_capacity(n_fanins);
        for _ in 0..n_fanins {
            prev = read_diff_value(&mut pos, prev)?;
            fanins.push(prev);
        }
        prev = read_diff_value(&mut pos, prev)?;
        ensure!(prev < aig.n_objs(), "Mapping root out of range");
        luts.push((fanins, prev));
    }
    aig.mapping = Some(luts);
    Ok(())
}

fn write_mapping_section(out: &mut Vec<u8>, luts: &[(Vec<usize>, usize)]) {
    let mut prev = 0usize;
    for (fanins, root) in luts {
        write_unsigned(out, fanins.len() as u32);
        for &fanin in fanins {
            write_diff_value(out, prev, fanin);
            prev = fanin;
        }
        write_diff_value(out, prev, *root);
        prev = *root;
    }
}

/// Packing blob: a raw little-endian integer array.
fn read_packing_section(payload: &[u8], aig: &mut Aig) -> Result<()> {
    ensure!(payload.len() % 4 == 0, "Packing section length not a multiple of 4");
    let mut packing = Vec::with_capacity(payload.len() / 4);
    for chunk in payload.chunks_exact(4) {
        packing.push(u32::from_le_bytes(chunk.try_into().unwrap()));
    }
    aig.packing = Some(packing);
    Ok(())
}

/// Writes the manager in binary AIGER form.
///
/// A non-normalized manager is re-ordered through `dup_normalized` first;
/// in that case the mapping and packing sections (which are keyed by raw
/// object ids) are not carried over. `compact` drops the symbol table and
/// the comment trailer regardless of `write_symbols`.
pub fn write_aiger(
    aig: &mut Aig,
    path: impl AsRef<Path>,
    write_symbols: bool,
    compact: bool,
) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path)
        .with_context(|| format!("Creating {}", path.display()))?;
    write_aiger_to(aig, &mut file, write_symbols, compact)
        .with_context(|| format!("Writing AIGER file {}", path.display()))
}

pub fn write_aiger_to(
    aig: &mut Aig,
    out: &mut impl Write,
    write_symbols: bool,
    compact: bool,
) -> Result<()> {
    if !aig.is_normalized() {
        let mut norm = aig.dup_normalized();
        norm.mapping = None;
        norm.packing = None;
        norm.ci_names = aig.ci_names.clone();
        norm.co_names = aig.co_names.clone();
        return write_aiger_to(&mut norm, out, write_symbols, compact);
    }
    let (i, l, o) = (aig.n_pis(), aig.n_regs(), aig.n_pos());
    let a = aig.n_ands();
    let m = i + l + a;
    writeln!(out, "aig {m} {i} {l} {o} {a}")?;
    for idx in 0..l {
        let ri = aig.ri(idx);
        writeln!(out, "{}", aig.child0(ri).into_raw())?;
    }
    for idx in 0..o {
        let po = aig.po(idx);
        writeln!(out, "{}", aig.child0(po).into_raw())?;
    }
    let mut body = Vec::new();
    for id in i + l + 1..i + l + 1 + a {
        debug_assert!(aig.is_and(id));
        let lhs = 2 * id as u32;
        let rhs0 = aig.child1(id).into_raw();
        let rhs1 = aig.child0(id).into_raw();
        write_unsigned(&mut body, lhs - rhs0);
        write_unsigned(&mut body, rhs0 - rhs1);
    }
    out.write_all(&body)?;

    for (tag, payload) in collect_sections(aig) {
        out.write_all(&[tag as u8])?;
        bincode::serialize_into(&mut *out, &(payload.len() as u32))?;
        out.write_all(&payload)?;
    }

    if write_symbols && !compact {
        write_symbol_table(aig, out)?;
    }
    if !compact {
        writeln!(out, "c")?;
        writeln!(out, "{}", aig.name.as_deref().unwrap_or("aig-rs"))?;
    }
    Ok(())
}

fn collect_sections(aig: &Aig) -> Vec<(SectionTag, Vec<u8>)> {
    let mut sections = Vec::new();
    if aig.has_equivs() {
        let mut payload = Vec::new();
        write_equiv_section(&mut payload, aig);
        sections.push((SectionTag::Equiv, payload));
    }
    if let Some(luts) = &aig.mapping {
        let mut payload = Vec::new();
        write_mapping_section(&mut payload, luts);
        sections.push((SectionTag::Mapping, payload));
    }
    if let Some(packing) = &aig.packing {
        let mut payload = Vec::with_capacity(4 * packing.len());
        for value in packing {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        sections.push((SectionTag::Packing, payload));
    }
    sections
}

fn write_symbol_table(aig: &Aig, out: &mut impl Write) -> Result<()> {
    if let Some(names) = &aig.ci_names {
        for idx in 0..aig.n_pis() {
            if !names[idx].is_empty() {
                writeln!(out, "i{idx} {}", names[idx])?;
            }
        }
        for idx in 0..aig.n_regs() {
            let name = &names[aig.n_pis() + idx];
            if !name.is_empty() {
                writeln!(out, "l{idx} {name}")?;
            }
        }
    }
    if let Some(names) = &aig.co_names {
        for idx in 0..aig.n_pos() {
            if !names[idx].is_empty() {
                writeln!(out, "o{idx} {}", names[idx])?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aig::equiv::REPR_VOID;
    use std::io::Cursor;

    fn counter2() -> Aig {
        // two-bit counter with PO = (b0 & b1)
        let mut aig = Aig::start(32);
        let b0 = aig.append_ci();
        let b1 = aig.append_ci();
        let n1 = aig.append_and(b0, b1.compl());
        let n2 = aig.append_and(b0.compl(), b1);
        let n3 = aig.append_and(n1.compl(), n2.compl());
        let bad = aig.append_and(b0, b1);
        aig.append_co(bad);
        aig.append_co(b0.compl());
        aig.append_co(n3.compl());
        aig.set_reg_num(2);
        aig
    }

    fn struct_eq(a: &Aig, b: &Aig) -> bool {
        a.n_objs() == b.n_objs()
            && a.cis() == b.cis()
            && a.cos() == b.cos()
            && a.n_regs() == b.n_regs()
            && (1..a.n_objs()).all(|id| {
                if a.is_and(id) || a.is_co(id) {
                    b.child0(id) == a.child0(id)
                        && (!a.is_and(id) || b.child1(id) == a.child1(id))
                } else {
                    a.is_ci(id) == b.is_ci(id)
                }
            })
    }

    #[test]
    fn roundtrip_plain() {
        let mut aig = counter2();
        let mut buf = Vec::new();
        write_aiger_to(&mut aig, &mut buf, false, false).unwrap();
        let back = read_aiger_from(Cursor::new(&buf)).unwrap();
        assert!(struct_eq(&aig, &back));
    }

    #[test]
    fn roundtrip_symbols() {
        let mut aig = counter2();
        aig.ci_names = Some(vec!["b0".into(), "b1".into()]);
        aig.co_names = Some(vec!["bad".into(), String::new(), String::new()]);
        let mut buf = Vec::new();
        write_aiger_to(&mut aig, &mut buf, true, false).unwrap();
        let back = read_aiger_from(Cursor::new(&buf)).unwrap();
        assert_eq!(
            back.ci_names.as_ref().unwrap(),
            &vec!["b0".to_string(), "b1".to_string()]
        );
        assert_eq!(back.co_names.as_ref().unwrap()[0], "bad");
    }

    #[test]
    fn roundtrip_gzip() {
        let mut aig = counter2();
        let mut plain = Vec::new();
        write_aiger_to(&mut aig, &mut plain, false, true).unwrap();
        let mut gz = flate2::write::GzEncoder::new(
            Vec::new(),
            flate2::Compression::default(),
        );
        gz.write_all(&plain).unwrap();
        let file = tempdir_path("roundtrip.aig.gz");
        std::fs::write(&file, gz.finish().unwrap()).unwrap();
        let back = read_aiger(&file).unwrap();
        assert!(struct_eq(&aig, &back));
        std::fs::remove_file(&file).ok();
    }

    #[test]
    fn roundtrip_equiv_section() {
        let mut aig = counter2();
        aig.equiv_start();
        aig.set_obj_repr(4, Repr::new(3, true));
        aig.set_obj_repr(5, Repr::new(0, false));
        aig.derive_nexts();
        let mut buf = Vec::new();
        write_aiger_to(&mut aig, &mut buf, false, false).unwrap();
        let back = read_aiger_from(Cursor::new(&buf)).unwrap();
        assert!(back.has_equivs());
        assert_eq!(back.obj_repr(4), 3);
        assert!(back.obj_proved(4));
        assert_eq!(back.obj_repr(5), 0);
        assert_eq!(back.obj_repr(6), REPR_VOID);
    }

    #[test]
    fn roundtrip_mapping_and_packing() {
        let mut aig = counter2();
        aig.mapping = Some(vec![(vec![1, 2], 5), (vec![2, 5], 6)]);
        aig.packing = Some(vec![7, 0, 0xFFFF_0001]);
        let mut buf = Vec::new();
        write_aiger_to(&mut aig, &mut buf, false, false).unwrap();
        let back = read_aiger_from(Cursor::new(&buf)).unwrap();
        assert_eq!(back.mapping, Some(vec![(vec![1, 2], 5), (vec![2, 5], 6)]));
        assert_eq!(back.packing, Some(vec![7, 0, 0xFFFF_0001]));
    }

    #[test]
    fn rejects_bad_header() {
        let err = read_aiger_from(Cursor::new(b"aag 1 1 0 0 0\n".as_slice()));
        assert!(err.is_err());
        let err = read_aiger_from(Cursor::new(b"aig 5 1 0 0 1\n".as_slice()));
        assert!(err.is_err());
    }

    #[test]
    fn rejects_nonzero_latch_init() {
        let text = b"aig 1 0 1 0 0\n2 1\n";
        assert!(read_aiger_from(Cursor::new(text.as_slice())).is_err());
    }

    fn tempdir_path(name: &str) -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("aig-rs-test-{}-{name}", std::process::id()));
        dir
    }
}
