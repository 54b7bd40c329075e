use crate::{
    api::TemplateClient,
    errors::{TemplateError, TemplateResult},
    model::template::BlockTemplate,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

/// A daemon stand-in serving a settable template and recording submissions.
pub struct TemplateClientMock {
    template: Mutex<TemplateResult<BlockTemplate>>,
    submit_result: Mutex<TemplateResult<()>>,
    delay: Mutex<Option<Duration>>,
    submitted: Mutex<Vec<Vec<u8>>>,
    get_block_template_calls: AtomicUsize,
}

impl TemplateClientMock {
    pub fn new(template: BlockTemplate) -> Self {
        Self {
            template: Mutex::new(Ok(template)),
            submit_result: Mutex::new(Ok(())),
            delay: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            get_block_template_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_template(&self, template: BlockTemplate) {
        *self.template.lock() = Ok(template);
    }

    pub fn set_error(&self, error: TemplateError) {
        *self.template.lock() = Err(error);
    }

    pub fn set_submit_result(&self, result: TemplateResult<()>) {
        *self.submit_result.lock() = result;
    }

    /// Makes every template fetch stall for `delay` first.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn get_block_template_calls(&self) -> usize {
        self.get_block_template_calls.load(Ordering::SeqCst)
    }

    pub fn submit_block_calls(&self) -> usize {
        self.submitted.lock().len()
    }

    pub fn submitted_blocks(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl TemplateClient for TemplateClientMock {
    async fn get_block_template(&self) -> TemplateResult<BlockTemplate> {
        self.get_block_template_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.template.lock().clone()
    }

    async fn submit_block(&self, block: &[u8]) -> TemplateResult<()> {
        self.submitted.lock().push(block.to_vec());
        self.submit_result.lock().clone()
    }
}
