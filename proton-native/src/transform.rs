//! Conversion between whole native blocks and their wire bytes.

use bytes::{Bytes, BytesMut};
use itertools::{Itertools, izip};
use log::{debug, error, trace};
use proton_error::{ContextExt, ProtonError, ProtonResult, proton_bail, proton_err};
use proton_io::wire::{write_leb128, write_leb128_str};
use proton_io::{ByteSource, Compressor};
use proton_types::{Block, InsertContext, QueryContext, TypeRef, get_from_name};

/// Size of the block info header sent ahead of each block when requested.
const BLOCK_INFO_SIZE: usize = 8;

/// Only the tail of a truncated stream is searched for the server's error text.
const ERROR_TAIL_SIZE: usize = 1024;

/// Entry points of the block transform in both directions.
pub struct NativeTransform;

impl NativeTransform {
    /// Decode a response body into a lazy stream of blocks.
    ///
    /// Column names and types are taken from the first block. The stream owns the source and
    /// closes it when it is exhausted, fails or is dropped.
    pub fn parse_response<S: ByteSource>(source: S, ctx: QueryContext) -> BlockStream<S> {
        BlockStream {
            source,
            ctx,
            column_names: Vec::new(),
            column_types: Vec::new(),
            block_count: 0,
            done: false,
        }
    }

    /// Encode the data of an insert into a lazy stream of body chunks, one per block, followed by
    /// the compression footer if there is one.
    pub fn build_insert(ctx: InsertContext) -> ProtonResult<InsertStream> {
        let compressor = Compressor::new(ctx.compression())?;
        Ok(InsertStream {
            ctx,
            compressor: Some(compressor),
        })
    }

    /// Encode one block without its prefix.
    pub fn write_block(block: &Block, ctx: &mut InsertContext) -> ProtonResult<BytesMut> {
        let mut out = BytesMut::new();
        write_leb128(block.column_count() as u64, &mut out);
        write_leb128(block.row_count() as u64, &mut out);
        for (name, col_type, column) in
            izip!(block.column_names(), block.column_types(), block.columns())
        {
            write_leb128_str(name, &mut out);
            write_leb128_str(&col_type.insert_name(), &mut out);
            ctx.start_column(name);
            if let Err(e) = col_type.write_column(column, &mut out, ctx) {
                error!(
                    "Error serializing column `{name}` into data type `{}`: {e}",
                    col_type.name()
                );
                return Err(e.with_context(format!("Invalid data in column `{name}`")));
            }
        }
        Ok(out)
    }
}

/// The blocks of a response body, decoded as they are pulled.
pub struct BlockStream<S: ByteSource> {
    source: S,
    ctx: QueryContext,
    column_names: Vec<String>,
    column_types: Vec<TypeRef>,
    block_count: usize,
    done: bool,
}

impl<S: ByteSource> BlockStream<S> {
    /// The column names, known once the first block is read.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_types(&self) -> &[TypeRef] {
        &self.column_types
    }

    pub fn context(&self) -> &QueryContext {
        &self.ctx
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Stop reading and release the source.
    pub fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.source.close();
        }
    }

    fn read_block(&mut self) -> ProtonResult<Option<Block>> {
        if self.source.at_end()? {
            return Ok(None);
        }
        if self.ctx.block_info() {
            self.source.read_bytes(BLOCK_INFO_SIZE)?;
        }
        let column_count = wire_usize(self.source.read_leb128()?)?;
        let row_count = wire_usize(self.source.read_leb128()?)?;
        if self.block_count > 0 && column_count != self.column_types.len() {
            proton_bail!(
                Protocol: "block {} has {column_count} columns, expected {}",
                self.block_count,
                self.column_types.len()
            );
        }
        trace!("reading block {} of {row_count} rows", self.block_count);
        let mut columns = Vec::with_capacity(column_count);
        for ix in 0..column_count {
            let name = self.source.read_leb128_str()?;
            let type_name = self.source.read_leb128_str()?;
            let col_type = if self.block_count == 0 {
                let col_type = get_from_name(&type_name)?;
                self.column_names.push(name.clone());
                self.column_types.push(col_type.clone());
                col_type
            } else {
                self.column_types[ix].clone()
            };
            if row_count == 0 {
                columns.push(Vec::new());
                continue;
            }
            self.ctx.start_column(&name);
            let column = col_type
                .read_column(&mut self.source, row_count, &self.ctx)
                .with_context(|| {
                    format!("Failed to read column `{name}` of type {}", col_type.name())
                })?;
            columns.push(column);
        }
        self.block_count += 1;
        Block::new(self.column_names.clone(), self.column_types.clone(), columns).map(Some)
    }

    /// A stream that ended in the middle of a block most likely carries the server's error.
    fn stream_failure(&self, err: ProtonError) -> ProtonError {
        if matches!(err.root(), ProtonError::StreamComplete(..)) {
            if let Some(message) = self.source.last_message() {
                return proton_err!(StreamFailure: "{}", extract_error_message(&message));
            }
        }
        err
    }
}

impl<S: ByteSource> Iterator for BlockStream<S> {
    type Item = ProtonResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_block() {
            Ok(Some(block)) => Some(Ok(block)),
            Ok(None) => {
                debug!("response complete after {} blocks", self.block_count);
                self.close();
                None
            }
            Err(e) => {
                let err = self.stream_failure(e);
                self.close();
                Some(Err(err))
            }
        }
    }
}

impl<S: ByteSource> Drop for BlockStream<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// The body chunks of an insert, encoded as they are pulled.
///
/// Every block is encoded completely before it is returned. An encoding error is returned in place
/// of its block and ends the stream, so a failed block is never partially sent.
pub struct InsertStream {
    ctx: InsertContext,
    compressor: Option<Compressor>,
}

impl InsertStream {
    pub fn context(&self) -> &InsertContext {
        &self.ctx
    }

    fn next_chunk(&mut self) -> ProtonResult<Option<Bytes>> {
        let Some(compressor) = self.compressor.as_mut() else {
            return Ok(None);
        };
        match self.ctx.next_block() {
            Some(block) => {
                let block = block?;
                let mut out = BytesMut::new();
                if let Some(prefix) = block.prefix() {
                    out.extend_from_slice(prefix);
                }
                out.extend_from_slice(&NativeTransform::write_block(&block, &mut self.ctx)?);
                trace!(
                    "encoded block {} of {} rows into {} bytes",
                    self.ctx.current_block(),
                    block.row_count(),
                    out.len()
                );
                compressor.compress_block(out.freeze()).map(Some)
            }
            None => match self.compressor.take() {
                Some(compressor) => compressor.finish(),
                None => Ok(None),
            },
        }
    }
}

impl Iterator for InsertStream {
    type Item = ProtonResult<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.next_chunk();
        if chunk.is_err() {
            self.compressor = None;
        }
        chunk.transpose()
    }
}

/// Recover the server's error text from the last chunk of a truncated stream.
///
/// The server appends its exception to the body when a query fails after the response has
/// started, so the text starts at the last `Code: ` marker, if any.
pub fn extract_error_message(message: &[u8]) -> String {
    let tail = &message[message.len().saturating_sub(ERROR_TAIL_SIZE)..];
    let start = tail.windows(6).position(|w| w == b"Code: ").unwrap_or(0);
    let tail = &tail[start..];
    match std::str::from_utf8(tail) {
        Ok(text) => text.to_string(),
        Err(_) => format!(
            "unrecognized data found in stream: `{}`",
            tail.iter().skip(64).map(|b| format!("{b:02x}")).join("")
        ),
    }
}

fn wire_usize(value: u64) -> ProtonResult<usize> {
    usize::try_from(value)
        .map_err(|_| proton_err!(Protocol: "block size {value} does not fit in memory"))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use proton_io::{ChunkIter, ChunkSource, Compression, ResponseBuffer, decompressing};
    use proton_scalar::Value;
    use proton_types::InsertData;
    use rstest::rstest;

    use super::*;

    const UINT16_NULLS: &str = "
        0104 0969 6e74 5f76 616c 7565 104e 756c
        6c61 626c 6528 5549 6e74 3136 2901 0001
        0000 0014 0000 0028 00";

    const LOW_CARDINALITY: &str = "
        0102 026c 6316 4c6f 7743 6172 6469 6e61
        6c69 7479 2853 7472 696e 6729 0100 0000
        0000 0000 0006 0000 0000 0000 0300 0000
        0000 0000 0004 4344 4d41 0347 534d 0200
        0000 0000 0000 0102 0101 026c 6316 4c6f
        7743 6172 6469 6e61 6c69 7479 2853 7472
        696e 6729 0100 0000 0000 0000 0006 0000
        0000 0000 0200 0000 0000 0000 0004 554d
        5453 0100 0000 0000 0000 01";

    const SIMPLE_MAP: &str = "
        0101 066e 6e5f 6d61 7013 4d61 7028 5374
        7269 6e67 2c20 5374 7269 6e67 2902 0000
        0000 0000 0004 6b65 7931 046b 6579 3206
        7661 6c75 6531 0676 616c 7565 32";

    fn hex(text: &str) -> Vec<u8> {
        let digits: Vec<u8> = text.bytes().filter(u8::is_ascii_hexdigit).collect();
        digits
            .chunks(2)
            .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16).unwrap())
            .collect()
    }

    fn source(bytes: &[u8], chunk_size: usize) -> ResponseBuffer<impl ChunkSource + use<>> {
        let chunks: Vec<Bytes> = bytes.chunks(chunk_size).map(Bytes::copy_from_slice).collect();
        ResponseBuffer::with_buffer_size(ChunkIter::new(chunks), chunk_size)
    }

    fn parse(bytes: &[u8], chunk_size: usize) -> Vec<Vec<Value>> {
        NativeTransform::parse_response(source(bytes, chunk_size), QueryContext::default())
            .map(|block| block.unwrap().rows())
            .concat()
    }

    fn insert_context(names: &[&str], types: &[&str], rows: Vec<Vec<Value>>) -> InsertContext {
        InsertContext::builder(
            "test_table",
            names.iter().map(|n| n.to_string()).collect(),
            types.iter().map(|t| get_from_name(t).unwrap()).collect(),
        )
        .data(InsertData::Rows(rows))
        .build()
        .unwrap()
    }

    #[rstest]
    #[case(256)]
    #[case(3)]
    fn nullable_column(#[case] chunk_size: usize) {
        assert_eq!(
            parse(&hex(UINT16_NULLS), chunk_size),
            vec![
                vec![Value::Null],
                vec![Value::UInt(20)],
                vec![Value::Null],
                vec![Value::UInt(40)]
            ]
        );
    }

    #[test]
    fn low_cardinality_blocks() {
        let data = hex(LOW_CARDINALITY);
        let mut stream =
            NativeTransform::parse_response(source(&data, 16), QueryContext::default());
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.row_count(), 2);
        assert_eq!(stream.column_names(), ["lc".to_string()]);
        assert_eq!(stream.column_types()[0].name(), "low_cardinality(String)");
        let second = stream.next().unwrap().unwrap();
        assert_eq!(second.rows(), vec![vec![Value::from("UMTS")]]);
        assert!(stream.next().is_none());
        assert_eq!(stream.block_count(), 2);
        assert_eq!(
            first.rows(),
            vec![vec![Value::from("CDMA")], vec![Value::from("GSM")]]
        );
    }

    #[test]
    fn map_column() {
        assert_eq!(
            parse(&hex(SIMPLE_MAP), 256),
            vec![vec![Value::Map(vec![
                (Value::from("key1"), Value::from("value1")),
                (Value::from("key2"), Value::from("value2")),
            ])]]
        );
    }

    struct ResetAfter {
        chunks: Vec<Bytes>,
    }

    impl ChunkSource for ResetAfter {
        fn next_chunk(&mut self) -> ProtonResult<Option<Bytes>> {
            if self.chunks.is_empty() {
                proton_bail!(Protocol: "connection reset by peer");
            }
            Ok(Some(self.chunks.remove(0)))
        }

        fn close(&mut self) {}
    }

    #[test]
    fn transport_failure_after_block() {
        let source = ResetAfter {
            chunks: vec![Bytes::from(hex(SIMPLE_MAP))],
        };
        let buffer = ResponseBuffer::with_buffer_size(source, 1);
        let results: Vec<_> =
            NativeTransform::parse_response(buffer, QueryContext::default()).collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().row_count(), 1);
        assert!(matches!(&results[1], Err(ProtonError::Protocol(..))));
    }

    #[test]
    fn block_info_is_skipped() {
        let mut bytes = vec![1, 0, 2, 0xff, 0xff, 0xff, 0xff, 0];
        bytes.extend(hex(UINT16_NULLS));
        let ctx = QueryContext::builder("").block_info(true).build().unwrap();
        let rows = NativeTransform::parse_response(source(&bytes, 64), ctx)
            .map(|block| block.unwrap().row_count())
            .sum::<usize>();
        assert_eq!(rows, 4);
    }

    #[test]
    fn empty_block_has_no_column_data() {
        let bytes = hex("0100 0576 616c 7565 0575 696e 7438");
        let blocks: Vec<Block> =
            NativeTransform::parse_response(source(&bytes, 64), QueryContext::default())
                .map(Result::unwrap)
                .collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].row_count(), 0);
        assert_eq!(blocks[0].column_names(), ["value".to_string()]);
    }

    #[test]
    fn truncated_stream_reports_server_error() {
        // a 100 row uint32 column followed by the server's exception instead of the data
        let mut header = hex("0164 0576 616c 7565 0675 696e 7433 32");
        header.extend_from_slice(&[0; 12]);
        let error = b"Code: 241. DB::Exception: Memory limit exceeded";
        let chunks = vec![Bytes::from(header), Bytes::from_static(error)];
        let buffer = ResponseBuffer::new(ChunkIter::new(chunks));
        let mut stream = NativeTransform::parse_response(buffer, QueryContext::default());
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, ProtonError::StreamFailure(..)));
        assert!(err.to_string().starts_with("Code: 241. DB::Exception: Memory limit exceeded"));
        assert!(stream.next().is_none());
    }

    #[test]
    fn unknown_type_ends_stream() {
        let bytes = hex("0101 0576 616c 7565 0a6e 6f74 5f61 5f74 7970 6500");
        let mut stream =
            NativeTransform::parse_response(source(&bytes, 64), QueryContext::default());
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, ProtonError::UnknownType(..)));
        assert!(err.to_string().starts_with("Unrecognized type base: not_a_type"));
        assert!(stream.next().is_none());
    }

    #[rstest]
    #[case(
        b"partial data Code: 60. DB::Exception: Table does not exist",
        "Code: 60. DB::Exception: Table does not exist"
    )]
    #[case(b"no marker", "no marker")]
    fn error_messages(#[case] message: &[u8], #[case] expected: &str) {
        assert_eq!(extract_error_message(message), expected);
    }

    #[test]
    fn binary_error_message() {
        let mut message = vec![0xffu8; 64];
        message.extend_from_slice(&[0xfe, 0x01]);
        assert_eq!(
            extract_error_message(&message),
            "unrecognized data found in stream: `fe01`"
        );
    }

    #[test]
    fn string_accepts_bytes() {
        let rows = vec![vec![Value::from(vec![0xffu8])]];
        let mut ctx = insert_context(&["value"], &["string"], rows);
        let block = ctx.next_block().unwrap().unwrap();
        let bytes = NativeTransform::write_block(&block, &mut ctx).unwrap();
        assert_eq!(bytes.as_ref(), hex("0101 0576 616c 7565 0673 7472 696e 6701 ff"));
    }

    #[test]
    fn tuple_rows() {
        let rows = ["string1", "string2", "string3"]
            .iter()
            .map(|s| vec![Value::tuple([*s])])
            .collect();
        let mut ctx = insert_context(&["value"], &["tuple(string)"], rows);
        let block = ctx.next_block().unwrap().unwrap();
        let bytes = NativeTransform::write_block(&block, &mut ctx).unwrap();
        assert_eq!(
            bytes.as_ref(),
            hex("0103 0576 616c 7565 0d74 7570 6c65 2873
                 7472 696e 6729 0773 7472 696e 6731 0773
                 7472 696e 6732 0773 7472 696e 6733")
        );
    }

    #[test]
    fn insert_chunks_carry_prefix_once() {
        let rows = (0..5u32).map(|v| vec![Value::from(v)]).collect();
        let types = vec![get_from_name("uint32").unwrap()];
        let ctx = InsertContext::builder("t", vec!["v".to_string()], types)
            .block_size(2)
            .data(InsertData::Rows(rows))
            .build()
            .unwrap();
        let chunks: Vec<Bytes> = NativeTransform::build_insert(ctx)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(chunks.len(), 3);
        let prefix = b"INSERT INTO t (`v`) FORMAT Native\n";
        assert!(chunks[0].starts_with(prefix));
        assert_eq!(chunks[0].len(), prefix.len() + 2 + 2 + 7 + 8);
        assert_eq!(chunks[2].as_ref(), hex("0101 0176 0675 696e 7433 3204 0000 00"));
    }

    #[test]
    fn bad_value_fails_insert() {
        let rows = vec![vec![Value::from(1u8)], vec![Value::Null]];
        let ctx = insert_context(&["v"], &["uint8"], rows);
        let mut chunks = NativeTransform::build_insert(ctx).unwrap();
        let err = chunks.next().unwrap().unwrap_err();
        assert!(err.is_data_error());
        assert!(err.to_string().starts_with("Invalid data in column `v`"));
        assert!(chunks.next().is_none());
    }

    #[rstest]
    #[case(Compression::Lz4)]
    #[case(Compression::Zstd)]
    fn compressed_insert_decodes(#[case] compression: Compression) {
        let rows: Vec<Vec<Value>> = (0..1000u32)
            .map(|v| vec![Value::from(v), Value::from(format!("row {v}"))])
            .collect();
        let ctx = InsertContext::builder(
            "t",
            vec!["key".to_string(), "text".to_string()],
            vec![get_from_name("uint32").unwrap(), get_from_name("string").unwrap()],
        )
        .block_size(300)
        .compression(compression)
        .data(InsertData::Rows(rows))
        .build()
        .unwrap();
        let chunks: Vec<Bytes> = NativeTransform::build_insert(ctx)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        let mut body =
            ResponseBuffer::new(decompressing(ChunkIter::new(chunks), compression).unwrap());
        let prefix = b"INSERT INTO t (`key`, `text`) FORMAT Native\n";
        assert_eq!(body.read_bytes(prefix.len()).unwrap().as_ref(), prefix);
        let decoded: Vec<Vec<Value>> =
            NativeTransform::parse_response(body, QueryContext::default())
                .map(|block| block.unwrap().rows())
                .concat();
        let expected: Vec<Vec<Value>> = (0..1000u64)
            .map(|v| vec![Value::UInt(v), Value::from(format!("row {v}"))])
            .collect();
        assert_eq!(decoded, expected);
    }
}
