pub use proton_types::*;
#[cfg(feature = "native")]
pub use proton_native as native;
pub use {
    proton_dtype as dtype, proton_error as error, proton_io as io, proton_scalar as scalar,
};

#[cfg(all(test, feature = "native"))]
mod test {
    use crate::io::{ChunkIter, ResponseBuffer};
    use crate::native::{NativeTransform, QueryResult};
    use crate::scalar::Value;
    use crate::{InsertContext, InsertData, QueryContext, get_from_name};

    #[test]
    fn round_trip_through_the_facade() {
        let insert = InsertContext::builder(
            "facade",
            vec!["word".to_string()],
            vec![get_from_name("string").unwrap()],
        )
        .data(InsertData::Columns(vec![vec![Value::from("hello")]]))
        .build()
        .unwrap();
        let body = NativeTransform::build_insert(insert)
            .unwrap()
            .map(Result::unwrap)
            .collect::<Vec<_>>()
            .concat();
        let statement_len = b"INSERT INTO facade (`word`) FORMAT Native\n".len();
        let source = ResponseBuffer::new(ChunkIter::new([body[statement_len..].to_vec().into()]));
        let query = QueryContext::builder("SELECT word FROM facade").build().unwrap();
        let result =
            QueryResult::from_stream(NativeTransform::parse_response(source, query)).unwrap();
        assert_eq!(result.first_row(), Some(vec![Value::from("hello")]));
    }
}
