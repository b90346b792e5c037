//! Trend-strength indicator (Wilder ADX)

use serde::{Deserialize, Serialize};

/// OHLC bar used for trend-strength computation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Average Directional Index with Wilder smoothing. Values range 0..=100;
/// readings above ~25 indicate a trending market.
pub fn adx(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < 2 * period + 1 {
        return None;
    }

    let mut trs = Vec::with_capacity(bars.len() - 1);
    let mut plus_dms = Vec::with_capacity(bars.len() - 1);
    let mut minus_dms = Vec::with_capacity(bars.len() - 1);

    for pair in bars.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);

        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        trs.push(tr);

        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;
        plus_dms.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dms.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    // Wilder smoothing: seed with the first `period` sum, then blend
    let smooth = |values: &[f64]| -> Vec<f64> {
        let mut out = Vec::with_capacity(values.len());
        let mut acc: f64 = values[..period].iter().sum();
        out.push(acc);
        for v in &values[period..] {
            acc = acc - acc / period as f64 + v;
            out.push(acc);
        }
        out
    };

    let tr_smooth = smooth(&trs);
    let plus_smooth = smooth(&plus_dms);
    let minus_smooth = smooth(&minus_dms);

    let mut dxs = Vec::with_capacity(tr_smooth.len());
    for i in 0..tr_smooth.len() {
        if tr_smooth[i] == 0.0 {
            dxs.push(0.0);
            continue;
        }
        let plus_di = 100.0 * plus_smooth[i] / tr_smooth[i];
        let minus_di = 100.0 * minus_smooth[i] / tr_smooth[i];
        let di_sum = plus_di + minus_di;
        dxs.push(if di_sum == 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / di_sum
        });
    }

    if dxs.len() < period {
        return None;
    }

    // ADX: Wilder-smoothed DX
    let mut adx: f64 = dxs[..period].iter().sum::<f64>() / period as f64;
    for dx in &dxs[period..] {
        adx = (adx * (period as f64 - 1.0) + dx) / period as f64;
    }

    Some(adx)
}
