// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule-based lead scorer.
//!
//! Additive points for engagement and purchase intent, clamped to
//! `0..=100`. Stands in for an external scoring service.

use async_trait::async_trait;

use atrium_core::traits::adapter::PluginAdapter;
use atrium_core::traits::scoring::{LeadScore, LeadScorer, LeadSignals};
use atrium_core::types::{AdapterType, ChannelType, ContactStatus, HealthStatus};
use atrium_core::AtriumError;

const INTENT_TERMS: &[&str] = &[
    "preço", "preco", "valor", "orçamento", "orcamento", "comprar", "contratar", "plano",
    "price", "quote", "buy", "purchase", "pricing",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(signals: &LeadSignals) -> f64 {
        if matches!(
            signals.contact_status,
            ContactStatus::Blocked | ContactStatus::Inactive
        ) {
            return 0.0;
        }

        let mut score: i64 = 0;
        score += signals.message_count.clamp(0, 10) * 3;
        score += signals.total_conversations.clamp(0, 5) * 5;
        score += match signals.channel_type {
            ChannelType::Whatsapp | ChannelType::Sms => 10,
            ChannelType::Email | ChannelType::Webchat => 5,
            ChannelType::Instagram | ChannelType::Facebook => 3,
        };

        let text = signals.text.to_lowercase();
        if INTENT_TERMS.iter().any(|t| text.contains(t)) {
            score += 30;
        }
        if signals.contact_status == ContactStatus::Customer {
            score += 10;
        }
        score.clamp(0, 100) as f64
    }
}

#[async_trait]
impl PluginAdapter for HeuristicScorer {
    fn name(&self) -> &str {
        "heuristic-scorer"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Scorer
    }

    async fn health_check(&self) -> Result<HealthStatus, AtriumError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), AtriumError> {
        Ok(())
    }
}

#[async_trait]
impl LeadScorer for HeuristicScorer {
    async fn score(&self, signals: LeadSignals) -> Result<LeadScore, AtriumError> {
        Ok(LeadScore {
            score: Self::compute(&signals),
        })
    }
}

#[cfg(test)]
mod tests {
    use atrium_core::types::{ContactId, TenantId};

    use super::*;

    fn signals(text: &str, messages: i64) -> LeadSignals {
        LeadSignals {
            tenant_id: TenantId::from("t1"),
            contact_id: ContactId::from("c1"),
            contact_status: ContactStatus::Lead,
            channel_type: ChannelType::Whatsapp,
            message_count: messages,
            total_conversations: 1,
            text: text.into(),
        }
    }

    #[test]
    fn first_message_scores_low() {
        assert_eq!(HeuristicScorer::compute(&signals("oi", 1)), 18.0);
    }

    #[test]
    fn intent_terms_raise_the_score() {
        let plain = HeuristicScorer::compute(&signals("bom dia", 4));
        let intent = HeuristicScorer::compute(&signals("Qual o PREÇO do plano?", 4));
        assert_eq!(intent - plain, 30.0);
    }

    #[test]
    fn score_is_clamped() {
        let mut s = signals("quero comprar", 500);
        s.total_conversations = 100;
        s.contact_status = ContactStatus::Customer;
        assert_eq!(HeuristicScorer::compute(&s), 100.0);
    }

    #[test]
    fn blocked_contacts_score_zero() {
        let mut s = signals("quero comprar", 5);
        s.contact_status = ContactStatus::Blocked;
        assert_eq!(HeuristicScorer::compute(&s), 0.0);
    }

    #[tokio::test]
    async fn scorer_trait_wraps_compute() {
        let score = HeuristicScorer::new().score(signals("oi", 1)).await.unwrap();
        assert_eq!(score.score, 18.0);
    }
}
