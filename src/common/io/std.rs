//! Common I/O code using sync I/O.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use flate2::bufread::MultiGzDecoder;

/// Returns whether the path looks like a gzip or bgzip file.
pub fn is_gz<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    [Some(Some("gz")), Some(Some("bgz"))].contains(&path.as_ref().extension().map(|s| s.to_str()))
}

/// Transparently open a file with gzip decoder.
///
/// Note that decoding of multi-member gzip files is automatically supported, as is needed for
/// `bgzip` files.
///
/// # Arguments
///
/// * `path` - A path to the file to open.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())
        .map_err(|e| anyhow::anyhow!("could not open file {}: {}", path.as_ref().display(), e))?;
    if is_gz(path.as_ref()) {
        tracing::trace!("Opening {:?} as gzip for reading", path.as_ref());
        let bufreader = BufReader::new(file);
        let decoder = MultiGzDecoder::new(bufreader);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path.as_ref());
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Transparently open a file with bgzip encoder for writing.
///
/// Output written through the bgzf writer can be indexed with `tabix` afterwards.
///
/// # Arguments
///
/// * `path` - A path to the file to open.
pub fn open_write_maybe_bgzf<P>(path: P) -> Result<Box<dyn Write>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref()).map_err(|e| {
        anyhow::anyhow!("could not create file {}: {}", path.as_ref().display(), e)
    })?;
    if is_gz(path.as_ref()) {
        tracing::trace!("Opening {:?} as bgzip for writing", path.as_ref());
        Ok(Box::new(noodles::bgzf::Writer::new(file)))
    } else {
        tracing::trace!("Opening {:?} as plain text for writing", path.as_ref());
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Open `path` for writing via [`open_write_maybe_bgzf`], `-` writes to stdout.
pub fn open_output(path: &str) -> Result<Box<dyn Write>, anyhow::Error> {
    if path == "-" {
        Ok(Box::new(BufWriter::new(std::io::stdout())))
    } else {
        open_write_maybe_bgzf(path)
    }
}

/// Return `std::io::Lines<>` for buffered reading from a file.
///
/// The output is wrapped in a Result to allow matching on errors
/// Returns an Iterator to the Reader of the lines of the file.
pub fn read_lines<P: AsRef<Path>>(filename: P) -> std::io::Result<std::io::Lines<BufReader<File>>> {
    let file = File::open(filename)?;
    Ok(BufReader::new(file).lines())
}

/// Read `KEY=VALUE` lines from `reader`, skipping empty lines and `#` comments.
///
/// Lines without a `=` are an error.  Only the first `=` splits key and value.
pub fn read_key_values<R: BufRead>(reader: R) -> Result<Vec<(String, String)>, anyhow::Error> {
    let mut result = Vec::new();
    for (no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => result.push((key.trim().to_string(), value.trim().to_string())),
            None => anyhow::bail!("line {}: expected KEY=VALUE but got {:?}", no + 1, line),
        }
    }
    Ok(result)
}
