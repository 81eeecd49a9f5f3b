// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The periodic executor: stats polling and rate adaptation on the fast
//! tick, link supervision (quality, keep-alive, roaming, antenna probes,
//! reconnect) on the one-second round.

use {
    super::*,
    crate::quality::{channel_quality, roam_candidates},
    log::{debug, info},
};

impl Mlme {
    /// One fast tick (100 ms on the reference tuning). Cheap work only;
    /// everything heavier runs on the one-second round.
    pub(crate) fn on_fast_tick(&mut self) {
        self.periodic.fast_round += 1;
        let delta = self.device.read_link_stats();
        self.periodic.rate_window.absorb(&delta);
        if let Some(rssi) = delta.rssi_dbm {
            self.antenna.note_rssi(delta.antenna, rssi);
        }
        if let Some(link) = &mut self.link {
            link.health.absorb(&delta);
            if delta.tx_no_retry_ok + delta.tx_retry_ok > 0 {
                link.last_activity = self.clock.now();
            }
            if let Some(rssi) = delta.rssi_dbm {
                link.rssi_dbm = rssi;
            }
        }

        if self.periodic.fast_round % self.cfg.rate_interval_ticks == 0 {
            if self.link.is_some() {
                let window = self.periodic.rate_window;
                if let Some(rate) = self.rate.on_window(&window) {
                    self.device.set_tx_rate(rate);
                }
            }
            self.periodic.rate_window.reset_window();
        }
        if self.periodic.fast_round % self.cfg.slow_tick_multiple == 0 {
            self.on_slow_tick();
        }
    }

    /// The one-second round. Skipped while off-channel: scan-time counters
    /// would poison the quality estimate.
    fn on_slow_tick(&mut self) {
        self.periodic.one_sec_round += 1;
        if self.aux.scan.is_some() {
            return;
        }
        match &self.link {
            Some(link) => {
                let bssid = link.bssid;
                let ssid = link.ssid.clone();
                let rssi_dbm = link.rssi_dbm;
                let last_beacon = link.last_beacon;
                let last_activity = link.last_activity;
                let health = link.health;
                self.supervise_link(bssid, &ssid, rssi_dbm, last_beacon, last_activity, &health);
                if let Some(link) = &mut self.link {
                    link.health.reset_window();
                }
            }
            None => self.try_reconnect(),
        }
        self.maybe_eval_antenna();
    }

    fn supervise_link(
        &mut self,
        bssid: MacAddr,
        ssid: &[u8],
        rssi_dbm: i8,
        last_beacon: Instant,
        last_activity: Instant,
        health: &crate::quality::LinkHealth,
    ) {
        let now = self.now();
        let quality = channel_quality(&self.cfg, health, rssi_dbm, last_beacon, now);
        {
            let mut status = self.status.lock();
            status.rssi_dbm = rssi_dbm;
            status.channel_quality = quality;
        }

        if quality == 0 {
            info!("link to {:02x?} is dead", bssid);
            self.link_down(mac::REASON_BEACON_LOST);
            return;
        }

        if quality < self.cfg.quality_bad_threshold {
            let candidates = {
                let table = self.scan_tab.lock();
                roam_candidates(&self.cfg, &table, ssid, &bssid, rssi_dbm, now)
            };
            match candidates.first() {
                Some(best) if self.machines.cntl.state() == cntl::CNTL_IDLE => {
                    debug!("quality {}: roaming to {:02x?}", quality, best.bssid);
                    self.enqueue_local(
                        MachineId::Cntl,
                        MT_CNTL_ROAM_REQ,
                        EventBody::Roam(best.bssid),
                    );
                }
                Some(_) => (),
                None => self.maybe_rescan(ssid, now),
            }
        }

        // Keep-alive on its fixed phase of the round, only when the link has
        // carried nothing for a while.
        if self.periodic.one_sec_round % self.cfg.keepalive_round_interval
            == self.cfg.keepalive_round_phase
            && now.saturating_duration_since(last_activity) >= self.cfg.keepalive_idle()
        {
            debug!("keep-alive to {:02x?}", bssid);
            let own = self.own_addr;
            let frame = mac::make_null_data_frame(&bssid, &own);
            self.send_frame(&frame);
            if let Some(link) = &mut self.link {
                link.last_activity = now;
            }
        }
    }

    /// A bad link with no roam candidates on file: refresh the table, rate
    /// limited so a stubbornly bad link doesn't turn into a scan loop.
    fn maybe_rescan(&mut self, ssid: &[u8], now: Instant) {
        let recently =
            self.aux.last_scan.map_or(false, |at| {
                now.saturating_duration_since(at) < self.cfg.rescan_backoff()
            });
        if recently || self.machines.sync.state() != sync::SYNC_IDLE {
            return;
        }
        debug!("bad link, no candidates on file: rescanning");
        self.enqueue_local(
            MachineId::Sync,
            MT_MLME_SCAN_REQ,
            EventBody::Scan(ScanRequest {
                ssid: ssid.to_vec(),
                scan_type: ScanType::Active,
                channels: Vec::new(),
            }),
        );
    }

    /// Lost link with auto-reconnect armed: retry the saved request, backed
    /// off so a vanished network isn't hammered.
    fn try_reconnect(&mut self) {
        if !self.aux.auto_reconnect || self.machines.cntl.state() != cntl::CNTL_IDLE {
            return;
        }
        let req = match &self.aux.reconnect {
            Some(req) => req.clone(),
            None => return,
        };
        let now = self.now();
        let due = self.aux.last_reconnect.map_or(true, |at| {
            now.saturating_duration_since(at) >= self.cfg.rescan_backoff()
        });
        if due {
            info!("reconnecting to {:?}", req.ssid);
            self.aux.last_reconnect = Some(now);
            self.enqueue_local(MachineId::Cntl, MT_CNTL_CONNECT_REQ, EventBody::Connect(req));
        }
    }

    /// Probe the secondary antenna on a relaxed cadence once the choice has
    /// proven stable. Skipped off-channel, during another probe, and on
    /// links good enough that switching could only hurt.
    fn maybe_eval_antenna(&mut self) {
        if self.link.is_none() || self.antenna.is_evaluating() {
            return;
        }
        if self.status.lock().channel_quality >= self.cfg.quality_good_threshold {
            return;
        }
        let period = if self.antenna.is_stable() {
            self.cfg.antenna_stable_period_secs
        } else {
            self.cfg.antenna_eval_period_secs
        };
        if period == 0 || self.periodic.one_sec_round % period != 0 {
            return;
        }
        self.antenna.begin_eval(self.device.as_mut());
        let now = self.now();
        self.timers.schedule(now, self.cfg.antenna_eval(), TimerEvent::AntennaEval);
    }
}
