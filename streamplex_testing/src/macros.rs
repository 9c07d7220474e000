//! Assertion macros for stepping through streams.

/// Await the next item of a stream and panic with context if it has ended.
///
/// The stream must be `Unpin`. The call site is included in the message.
#[macro_export]
macro_rules! next_expect {
    ($stream:expr) => {{
        $crate::futures::StreamExt::next(&mut $stream)
            .await
            .expect(concat!("stream ended early at ", file!(), ":", line!()))
    }};
    ($stream:expr, $msg:expr) => {{
        let m = ::std::format!("{msg} at {}:{}", file!(), line!(), msg = $msg);
        $crate::futures::StreamExt::next(&mut $stream).await.expect(&m)
    }};
}

/// Await the next item of a stream and panic unless the stream has ended.
#[macro_export]
macro_rules! end_expect {
    ($stream:expr) => {{
        let item = $crate::futures::StreamExt::next(&mut $stream).await;
        assert!(
            item.is_none(),
            concat!("stream should have ended at ", file!(), ":", line!())
        );
    }};
}
